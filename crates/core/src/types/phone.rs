//! Mainland China mobile number.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Phone`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Not exactly 11 ASCII digits.
    #[error("phone number must be 11 digits")]
    Length,
    /// Does not start with `1` followed by `3`-`9`.
    #[error("phone number must start with 13-19")]
    Prefix,
}

/// An 11-digit mobile number matching `1[3-9]\d{9}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneError`] if the number is malformed.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let s = s.trim();
        let bytes = s.as_bytes();
        if bytes.len() != 11 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(PhoneError::Length);
        }
        match bytes {
            [b'1', b'3'..=b'9', ..] => Ok(Self(s.to_owned())),
            _ => Err(PhoneError::Prefix),
        }
    }

    /// The number as typed (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
