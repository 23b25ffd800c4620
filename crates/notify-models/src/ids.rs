//! Type-safe identifier wrappers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used for broadcast (channel) subscribers created by the
/// single-tenant bootstrap.
pub const CHANNEL_PREFIX: &str = "channel-";

/// External identity of a subscriber (usually the Telegram chat id).
///
/// The id doubles as the storage key, so it is restricted to characters
/// that are safe in a file name; see [`SubscriberId::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Creates an id from an external handle.
    pub fn new(external: impl Into<String>) -> Self {
        Self(external.into())
    }

    /// Id for the broadcast subscriber bound to a Telegram channel.
    pub fn for_channel(channel: &str) -> Self {
        let cleaned: String = channel
            .trim_start_matches('@')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Self(format!("{}{}", CHANNEL_PREFIX, cleaned))
    }

    /// Returns the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is non-empty and only contains `[A-Za-z0-9_.-]`.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    /// Parses the id as a numeric Telegram chat id, if it is one.
    pub fn as_chat_id(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubscriberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for SubscriberId {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

impl AsRef<str> for SubscriberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_roundtrip() {
        let id = SubscriberId::from(-100123456_i64);
        assert_eq!(id.as_str(), "-100123456");
        assert_eq!(id.as_chat_id(), Some(-100123456));
        assert!(id.is_valid());
    }

    #[test]
    fn test_channel_id() {
        let id = SubscriberId::for_channel("@team:alerts");
        assert_eq!(id.as_str(), "channel-team_alerts");
        assert!(id.is_valid());
        assert_eq!(id.as_chat_id(), None);
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!SubscriberId::new("").is_valid());
        assert!(!SubscriberId::new("..").is_valid());
        assert!(!SubscriberId::new("a/b").is_valid());
        assert!(!SubscriberId::new("x y").is_valid());
    }

    #[test]
    fn test_serialization() {
        let id = SubscriberId::new("42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
