//! Phone number normalization for SMS delivery.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Number of trailing digits kept as the canonical recipient.
pub const CANONICAL_DIGITS: usize = 10;

/// A canonical 10-digit recipient number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strip every non-digit and keep the last ten digits.
    ///
    /// Fails when fewer than ten digits remain.
    pub fn normalize(raw: &str) -> ModelResult<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < CANONICAL_DIGITS {
            return Err(ModelError::InvalidPhone(format!(
                "'{}' has {} digits, need at least {}",
                raw,
                digits.len(),
                CANONICAL_DIGITS
            )));
        }
        Ok(Self(digits[digits.len() - CANONICAL_DIGITS..].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_international_format() {
        let phone = PhoneNumber::normalize("+91 98765-43210").unwrap();
        assert_eq!(phone.as_str(), "9876543210");
    }

    #[test]
    fn test_normalize_keeps_last_ten_digits() {
        let phone = PhoneNumber::normalize("0091 (987) 654 3210").unwrap();
        assert_eq!(phone.as_str(), "9876543210");
    }

    #[test]
    fn test_normalize_rejects_short_numbers() {
        assert!(matches!(
            PhoneNumber::normalize("12345"),
            Err(ModelError::InvalidPhone(_))
        ));
        assert!(PhoneNumber::normalize("").is_err());
        assert!(PhoneNumber::normalize("call me maybe").is_err());
    }
}
