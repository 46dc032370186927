//! Order status as reported by the plant backend.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Order lifecycle status.
///
/// The backend encodes status as an integer. Code `1` is unused; any code
/// outside the known set is kept as `Unknown` so the order still renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    /// Created, awaiting payment (code 0).
    Pending,
    /// Paid (code 2).
    Paid,
    /// Handed to the courier (code 3).
    Shipped,
    /// Delivered and closed (code 4).
    Completed,
    /// Cancelled by the buyer or timed out (code 5).
    Cancelled,
    /// Any other code.
    Unknown(i64),
}

impl OrderStatus {
    /// Map a backend status code.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Pending,
            2 => Self::Paid,
            3 => Self::Shipped,
            4 => Self::Completed,
            5 => Self::Cancelled,
            other => Self::Unknown(other),
        }
    }

    /// The backend status code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Paid => 2,
            Self::Shipped => 3,
            Self::Completed => 4,
            Self::Cancelled => 5,
            Self::Unknown(code) => *code,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Awaiting payment",
            Self::Paid => "Paid",
            Self::Shipped => "Shipped",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Unknown(_) => "Unknown status",
        }
    }

    /// CSS modifier class for the status tag.
    #[must_use]
    pub const fn css_class(&self) -> &'static str {
        match self {
            Self::Pending => "status-pending",
            Self::Paid => "status-paid",
            Self::Shipped => "status-shipped",
            Self::Completed => "status-completed",
            Self::Cancelled => "status-cancelled",
            Self::Unknown(_) => "status-default",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::from_code)
    }
}
