//! Wire formats: the account push payload and portal request bodies.

use lumen_core::{AccountId, SessionKey};
use serde::Serialize;

/// Text preceding each account id in a push line.
pub const ACCOUNT_PREFIX: &str = "{\"account\":\"";
/// Text following each account id in a push line.
pub const ACCOUNT_SUFFIX: &str = "\"}";
/// Splits performed on the stripped payload. Anything after the last split
/// stays in the final element untouched.
pub const MAX_SPLITS: usize = 2;

/// Extract account ids from a push payload.
///
/// The payload is one `{"account":"<id>"}` object per line, which is not a
/// JSON document as a whole. Framing is removed by plain string replacement,
/// then the text is split on `\n` at most [`MAX_SPLITS`] times. Empty pieces
/// are dropped and do not count towards the split limit.
///
/// No validation is done on the ids; garbage simply fails to match a wallet
/// later on.
pub fn parse_account_ids(text: &str) -> Vec<AccountId> {
    let stripped = text.replace(ACCOUNT_PREFIX, "").replace(ACCOUNT_SUFFIX, "");

    let mut ids = Vec::new();
    let mut rest = stripped.as_str();
    while ids.len() < MAX_SPLITS {
        let Some((piece, tail)) = rest.split_once('\n') else {
            break;
        };
        if !piece.is_empty() {
            ids.push(AccountId::from_raw(piece));
        }
        rest = tail;
    }
    if !rest.is_empty() {
        ids.push(AccountId::from_raw(rest));
    }

    ids
}

/// Body of `listen_account` and `remove_account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRequest {
    pub key: SessionKey,
    pub account: AccountId,
}

/// Body of `remove_ws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRequest {
    pub key: SessionKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(text: &str) -> Vec<String> {
        parse_account_ids(text)
            .into_iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_parse_two_accounts_with_trailing_newline() {
        let payload = "{\"account\":\"GABC123\"}\n{\"account\":\"GXYZ789\"}\n";
        assert_eq!(ids(payload), vec!["GABC123", "GXYZ789"]);
    }

    #[test]
    fn test_parse_single_account_without_newline() {
        assert_eq!(ids("{\"account\":\"GONLY\"}"), vec!["GONLY"]);
    }

    #[test]
    fn test_parse_drops_empty_lines() {
        let payload = "\n\n{\"account\":\"GA\"}\n\n{\"account\":\"GB\"}\n\n";
        assert_eq!(ids(payload), vec!["GA", "GB"]);
    }

    #[test]
    fn test_parse_empty_payload() {
        assert!(ids("").is_empty());
        assert!(ids("\n\n").is_empty());
    }

    #[test]
    fn test_parse_keeps_remainder_after_two_splits() {
        let payload =
            "{\"account\":\"GA\"}\n{\"account\":\"GB\"}\n{\"account\":\"GC\"}\n{\"account\":\"GD\"}";
        assert_eq!(ids(payload), vec!["GA", "GB", "GC\nGD"]);
    }

    #[test]
    fn test_parse_unframed_text_passes_through() {
        assert_eq!(ids("hello"), vec!["hello"]);
    }

    #[test]
    fn test_request_bodies() {
        let body = AccountRequest {
            key: SessionKey::from_string("k1".to_string()),
            account: AccountId::from_raw("GA"),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"key": "k1", "account": "GA"})
        );

        let body = ConnectionRequest {
            key: SessionKey::from_string("k1".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"key": "k1"})
        );
    }
}
