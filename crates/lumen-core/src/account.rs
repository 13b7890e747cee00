//! Stellar account identification.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a strkey-encoded Stellar public key.
pub const ACCOUNT_ID_LEN: usize = 56;

/// Stellar account identifier (strkey public key, `G...`).
///
/// Identifiers read off the push socket are wrapped unchecked with
/// [`AccountId::from_raw`]; the wire format carries no validation and a
/// malformed entry simply never matches a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parse and validate a public key.
    ///
    /// Checks the `G` version prefix, the length and the base32 alphabet.
    /// The CRC is not verified.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != ACCOUNT_ID_LEN {
            return Err(CoreError::InvalidAccountId(format!(
                "expected {ACCOUNT_ID_LEN} characters, got {}",
                s.len()
            )));
        }
        if !s.starts_with('G') {
            return Err(CoreError::InvalidAccountId(format!(
                "{s}: public keys start with 'G'"
            )));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !matches!(c, 'A'..='Z' | '2'..='7'))
        {
            return Err(CoreError::InvalidAccountId(format!(
                "{s}: invalid character {c:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Wrap a string without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines (`GABC…WXYZ`).
    pub fn short(&self) -> String {
        if self.0.len() <= 12 || !self.0.is_ascii() {
            return self.0.clone();
        }
        format!("{}…{}", &self.0[..4], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::from_raw(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self::from_raw(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";

    #[test]
    fn test_parse_valid_public_key() {
        let id = AccountId::parse(VALID).unwrap();
        assert_eq!(id.as_str(), VALID);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = AccountId::parse(&format!("  {VALID}\n")).unwrap();
        assert_eq!(id.as_str(), VALID);
    }

    #[test]
    fn test_parse_rejects_secret_seed_prefix() {
        let seed = format!("S{}", &VALID[1..]);
        assert!(matches!(
            AccountId::parse(&seed),
            Err(CoreError::InvalidAccountId(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_length_and_alphabet() {
        assert!(AccountId::parse("GABC123").is_err());
        let lower = VALID.to_lowercase().replacen('g', "G", 1);
        assert!(AccountId::parse(&lower).is_err());
    }

    #[test]
    fn test_from_raw_accepts_anything() {
        let id = AccountId::from_raw("not-a-key\n");
        assert_eq!(id.as_str(), "not-a-key\n");
    }

    #[test]
    fn test_short_form() {
        let id = AccountId::from_raw(VALID);
        assert_eq!(id.short(), "GBRP…OX2H");
        assert_eq!(AccountId::from_raw("GABC").short(), "GABC");
    }

    #[test]
    fn test_serde_transparent() {
        let id = AccountId::from_raw("GABC");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"GABC\"");
    }
}
