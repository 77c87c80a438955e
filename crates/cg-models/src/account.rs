//! Account identifier.
//!
//! Every guard, camera and gate setting belongs to exactly one account. The
//! identifier is the account holder's email address, stored denormalized on
//! each record and used as a mandatory filter on every read and write.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::error::{ModelError, ModelResult};

/// Normalized account identifier (lowercased email).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Parse and normalize a raw identifier.
    pub fn parse(raw: &str) -> ModelResult<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ModelError::InvalidAccount(
                "account identifier (user_email) is required".to_string(),
            ));
        }
        if !normalized.validate_email() {
            return Err(ModelError::InvalidAccount(format!(
                "'{}' is not a valid email address",
                raw.trim()
            )));
        }
        Ok(Self(normalized))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_normalization() {
        let id = AccountId::parse("  Ops@GateHouse.in ").unwrap();
        assert_eq!(id.as_str(), "ops@gatehouse.in");
    }

    #[test]
    fn test_account_rejects_blank_and_malformed() {
        assert!(matches!(AccountId::parse("   "), Err(ModelError::InvalidAccount(_))));
        assert!(AccountId::parse("not-an-email").is_err());
    }

    #[test]
    fn test_account_deserialize_validates() {
        let ok: Result<AccountId, _> = serde_json::from_str("\"a@b.co\"");
        assert!(ok.is_ok());
        let bad: Result<AccountId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
