//! Session key correlating a socket with its per-account registrations.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Minimum length the portal accepts for a session key.
pub const MIN_SESSION_KEY_LEN: usize = 32;

/// Opaque random token generated once per socket connection.
///
/// The key is embedded in the socket URL and sent with every
/// `listen_account` / `remove_account` / `remove_ws` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generate a fresh key: 32 lowercase hex characters.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Use an existing key (tests, replays).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_length() {
        let key = SessionKey::generate();
        assert!(key.as_str().len() >= MIN_SESSION_KEY_LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(SessionKey::generate(), SessionKey::generate());
    }
}
