//! Line-item quantity that can never drop below one.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Quantity of a cart or order line.
///
/// Always at least 1. Constructors clamp instead of failing, so a quantity
/// control that sends `0` (or a stale form that sends a negative number)
/// ends up at 1 rather than producing an error page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// The smallest valid quantity.
    pub const ONE: Self = Self(1);

    /// Create a quantity, clamping `0` up to `1`.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        if value == 0 { Self::ONE } else { Self(value) }
    }

    /// Create a quantity from a signed value, clamping anything below 1.
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self::new(u32::try_from(value.max(1)).unwrap_or(u32::MAX))
    }

    /// The raw count.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Add another quantity, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// One more.
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// One less, stopping at 1.
    #[must_use]
    pub const fn decrement(self) -> Self {
        Self::new(self.0.saturating_sub(1))
    }

    /// Clamp to a stock ceiling. A ceiling of zero leaves the quantity alone;
    /// sold-out lines are flagged elsewhere.
    #[must_use]
    pub fn capped_at(self, ceiling: u32) -> Self {
        if ceiling == 0 {
            self
        } else {
            Self::new(self.0.min(ceiling))
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_i64)
    }
}
