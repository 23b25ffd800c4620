//! Subscriber model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SubscriberId;
use crate::setup::SetupState;

/// Default polling interval for new subscribers, in minutes.
pub const DEFAULT_INTERVAL_MIN: u32 = 5;

/// Where alerts for a subscriber are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "chat_id", rename_all = "snake_case")]
pub enum Destination {
    /// The configured broadcast channel.
    Broadcast,
    /// A specific chat.
    Chat(i64),
}

/// A secret that has already been encrypted by the credential vault.
///
/// The wrapped string is the vault's opaque ciphertext encoding. Plaintext
/// tokens and passwords must never be wrapped in this type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    /// Wraps vault output.
    pub fn from_ciphertext(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    /// The opaque ciphertext.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedSecret({} bytes)", self.0.len())
    }
}

/// An end user or channel registered to receive unread alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    /// External identity, unique across the store.
    pub id: SubscriberId,
    /// Alert destination.
    pub destination: Destination,
    /// Backend base URL.
    #[serde(default)]
    pub rc_server: Option<String>,
    /// Backend username.
    #[serde(default)]
    pub rc_user: Option<String>,
    /// Encrypted session token.
    #[serde(default)]
    pub rc_token: Option<EncryptedSecret>,
    /// Encrypted password, only kept when password retention is enabled.
    #[serde(default)]
    pub rc_password: Option<EncryptedSecret>,
    /// Backend user id.
    #[serde(default)]
    pub rc_user_id: Option<String>,
    /// Optional backend instance id.
    #[serde(default)]
    pub rc_instance_id: Option<String>,
    /// Polling interval in minutes.
    #[serde(default = "default_interval")]
    pub interval_min: u32,
    /// Soft on/off switch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Watermark: last unread total already alerted or observed.
    #[serde(default)]
    pub last_unread: u64,
    /// Set when the backend rejected the stored token and no password is
    /// retained to log in again.
    #[serde(default)]
    pub needs_reauth: bool,
    /// In-progress setup wizard, if any.
    #[serde(default)]
    pub setup: Option<SetupState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_MIN
}

fn default_enabled() -> bool {
    true
}

impl Subscriber {
    /// Creates an enabled subscriber with no backend credentials.
    ///
    /// Numeric ids get a per-chat destination; anything else is treated as
    /// the broadcast subscriber.
    pub fn new(id: SubscriberId) -> Self {
        let now = Utc::now();
        let destination = match id.as_chat_id() {
            Some(chat_id) => Destination::Chat(chat_id),
            None => Destination::Broadcast,
        };
        Self {
            id,
            destination,
            rc_server: None,
            rc_user: None,
            rc_token: None,
            rc_password: None,
            rc_user_id: None,
            rc_instance_id: None,
            interval_min: DEFAULT_INTERVAL_MIN,
            enabled: true,
            last_unread: 0,
            needs_reauth: false,
            setup: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the alert destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Whether an encrypted password is available for re-login.
    pub fn has_password(&self) -> bool {
        self.rc_password.is_some() && self.rc_user.is_some()
    }

    /// Names of the fields required for a token-based check that are
    /// missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.rc_server.as_deref().map_or(true, str::is_empty) {
            missing.push("server");
        }
        if self.rc_token.is_none() {
            missing.push("token");
        }
        if self.rc_user_id.as_deref().map_or(true, str::is_empty) {
            missing.push("user_id");
        }
        missing
    }

    /// Whether the subscriber can be checked: either the token triple is
    /// complete, or a server and retained password allow a fresh login.
    pub fn is_configured(&self) -> bool {
        let missing = self.missing_fields();
        missing.is_empty() || (!missing.contains(&"server") && self.has_password())
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
