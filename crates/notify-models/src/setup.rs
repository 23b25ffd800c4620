//! Setup wizard state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current step of the setup wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStep {
    /// Waiting for the server URL.
    Server,
    /// Waiting for the username.
    User,
    /// Waiting for the password.
    Pass,
}

/// Transient per-subscriber wizard state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupState {
    pub step: SetupStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SetupState {
    /// A fresh wizard at the first step.
    pub fn start() -> Self {
        Self {
            step: SetupStep::Server,
            server: None,
            user: None,
            created_at: Utc::now(),
        }
    }

    /// Move to the username step, remembering the server.
    pub fn with_server(self, server: impl Into<String>) -> Self {
        Self {
            step: SetupStep::User,
            server: Some(server.into()),
            ..self
        }
    }

    /// Move to the password step, remembering the username.
    pub fn with_user(self, user: impl Into<String>) -> Self {
        Self {
            step: SetupStep::Pass,
            user: Some(user.into()),
            ..self
        }
    }
}
