//! Cache types for catalog responses.

use std::sync::Arc;

use myrmeco_core::PlantId;

use super::types::{PlantDetail, PlantSummary};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Plants,
    PlantDetail(PlantId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Plants(Arc<Vec<PlantSummary>>),
    PlantDetail(Box<PlantDetail>),
}
