//! Authenticated backend handle.

use std::fmt;

/// An authenticated session with the chat backend.
///
/// Holds the plaintext auth token, so it is never persisted and its
/// `Debug` output redacts the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Auth token (`X-Auth-Token`).
    pub auth_token: String,
    /// Backend user id (`X-User-Id`).
    pub user_id: String,
    /// Optional backend instance id (`X-Instance-Id`).
    pub instance_id: Option<String>,
}

impl Session {
    /// Creates a session.
    pub fn new(auth_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            user_id: user_id.into(),
            instance_id: None,
        }
    }

    /// Sets the instance id.
    pub fn with_instance_id(mut self, instance_id: Option<String>) -> Self {
        self.instance_id = instance_id;
        self
    }

    /// Short user id prefix, safe for logs.
    pub fn user_label(&self) -> &str {
        let end = self
            .user_id
            .char_indices()
            .nth(6)
            .map(|(i, _)| i)
            .unwrap_or(self.user_id.len());
        &self.user_id[..end]
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("auth_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}
