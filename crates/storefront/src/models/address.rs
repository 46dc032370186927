//! Shipping address kept per user in the session.

use myrmeco_core::{Phone, PhoneError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an address can't be saved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Please fill in the receiver, phone, province, and street address")]
    Incomplete,
    #[error("Phone number format is invalid")]
    Phone(#[from] PhoneError),
}

/// Where the order ships to. Field names match the address form and the
/// payment request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub detail_address: String,
}

impl ShippingAddress {
    /// Trim every field.
    #[must_use]
    pub fn normalized(self) -> Self {
        let trim = |s: String| s.trim().to_string();
        Self {
            receiver: trim(self.receiver),
            phone: trim(self.phone),
            province: trim(self.province),
            city: trim(self.city),
            area: trim(self.area),
            detail_address: trim(self.detail_address),
        }
    }

    /// Receiver, phone, province, and street address are required; the
    /// phone must be a valid mobile number. City and area are optional.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), AddressError> {
        let required = [
            &self.receiver,
            &self.phone,
            &self.province,
            &self.detail_address,
        ];
        if required.iter().any(|f| f.trim().is_empty()) {
            return Err(AddressError::Incomplete);
        }
        Phone::parse(&self.phone)?;
        Ok(())
    }

    /// One-line postal summary, skipping empty parts.
    #[must_use]
    pub fn summary(&self) -> String {
        [&self.province, &self.city, &self.area, &self.detail_address]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            receiver: "Li Wei".to_string(),
            phone: "13800138000".to_string(),
            province: "Yunnan".to_string(),
            city: "Kunming".to_string(),
            area: String::new(),
            detail_address: "12 Greenhouse Rd".to_string(),
        }
    }

    #[test]
    fn test_valid_address() {
        assert_eq!(address().validate(), Ok(()));
        assert_eq!(address().summary(), "Yunnan Kunming 12 Greenhouse Rd");
    }

    #[test]
    fn test_missing_required_field() {
        let mut a = address();
        a.detail_address = "   ".to_string();
        assert_eq!(a.validate(), Err(AddressError::Incomplete));

        let mut a = address();
        a.city = String::new();
        assert_eq!(a.validate(), Ok(()));
    }

    #[test]
    fn test_bad_phone() {
        let mut a = address();
        a.phone = "12345".to_string();
        assert!(matches!(a.validate(), Err(AddressError::Phone(_))));
    }

    #[test]
    fn test_normalized_and_wire_names() {
        let mut a = address();
        a.receiver = "  Li Wei ".to_string();
        let a = a.normalized();
        assert_eq!(a.receiver, "Li Wei");

        let json = serde_json::to_value(&a).unwrap_or_default();
        assert_eq!(json["detailAddress"], "12 Greenhouse Rd");
    }
}
