//! Error types for the Telegram bot.

use thiserror::Error;

use notify_backend::BackendError;
use notify_core::{ConfigError, VaultError};
use notify_persistence::PersistenceError;
use notify_runtime::{RuntimeError, SessionError};

/// Errors that can occur while wiring or running the bot.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Configuration missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Vault could not be initialised.
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    /// Subscriber store failure.
    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),

    /// Backend client could not be built.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Login or session failure.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Background runtime failure.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// User input rejected before reaching the backend.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failed to start the bot.
    #[error("Failed to start bot: {0}")]
    BotStartFailed(String),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;

impl TelegramError {
    /// Text shown to a chat user. Never includes backend payloads.
    pub fn user_message(&self) -> String {
        match self {
            Self::Session(SessionError::Backend(BackendError::Auth(_))) => {
                "Login failed: wrong username or password.".to_string()
            }
            Self::Session(SessionError::Backend(BackendError::Unavailable { .. }))
            | Self::Session(SessionError::Backend(BackendError::Transport(_)))
            | Self::Session(SessionError::Backend(BackendError::Status(_))) => {
                "The server is not reachable right now. Try again later.".to_string()
            }
            Self::Session(SessionError::Backend(BackendError::InvalidResponse(_))) => {
                "The server answered with something unexpected. Is it a Rocket.Chat server?".to_string()
            }
            Self::InvalidInput(reason) => reason.clone(),
            _ => "Something went wrong. Try again later.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_details() {
        let err = TelegramError::from(SessionError::Backend(BackendError::Auth(
            "token abc123 rejected".into(),
        )));
        let text = err.user_message();
        assert!(text.contains("wrong username or password"));
        assert!(!text.contains("abc123"));
    }

    #[test]
    fn test_user_message_for_outage() {
        let err = TelegramError::from(SessionError::Backend(BackendError::Unavailable {
            attempts: 3,
            source: Box::new(BackendError::Status(502)),
        }));
        assert!(err.user_message().contains("not reachable"));
    }
}
