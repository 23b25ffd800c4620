//! Raw per-conversation state as returned by the chat backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation type, read from the `t` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Public channel (`c`).
    Channel,
    /// Direct message (`d`).
    Direct,
    /// Private group (`p`).
    PrivateGroup,
    /// Any other or missing code.
    Other,
}

impl SubscriptionKind {
    /// Maps a backend type code to a kind.
    pub fn from_code(code: &str) -> Self {
        match code {
            "c" => Self::Channel,
            "d" => Self::Direct,
            "p" => Self::PrivateGroup,
            _ => Self::Other,
        }
    }
}

/// One subscription record.
///
/// Records are kept as loose JSON: the backend varies which unread fields
/// it fills in, and malformed values must never fail deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionRecord(Value);

impl SubscriptionRecord {
    /// Wraps a raw JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns a field if it is present and not `null`.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// The conversation type.
    pub fn kind(&self) -> SubscriptionKind {
        self.field("t")
            .and_then(Value::as_str)
            .map(SubscriptionKind::from_code)
            .unwrap_or(SubscriptionKind::Other)
    }

    /// Conversation name, if the backend sent one.
    pub fn name(&self) -> Option<&str> {
        self.field("fname")
            .or_else(|| self.field("name"))
            .and_then(Value::as_str)
    }

    /// Borrow the raw value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for SubscriptionRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_codes() {
        assert_eq!(SubscriptionRecord::new(json!({"t": "c"})).kind(), SubscriptionKind::Channel);
        assert_eq!(SubscriptionRecord::new(json!({"t": "d"})).kind(), SubscriptionKind::Direct);
        assert_eq!(SubscriptionRecord::new(json!({"t": "p"})).kind(), SubscriptionKind::PrivateGroup);
        assert_eq!(SubscriptionRecord::new(json!({"t": "l"})).kind(), SubscriptionKind::Other);
        assert_eq!(SubscriptionRecord::new(json!({})).kind(), SubscriptionKind::Other);
    }

    #[test]
    fn test_null_field_is_absent() {
        let record = SubscriptionRecord::new(json!({"unread": null, "msgs": 2}));
        assert!(record.field("unread").is_none());
        assert_eq!(record.field("msgs"), Some(&json!(2)));
    }

    #[test]
    fn test_name_prefers_fname() {
        let record = SubscriptionRecord::new(json!({"name": "general", "fname": "General"}));
        assert_eq!(record.name(), Some("General"));
    }
}
