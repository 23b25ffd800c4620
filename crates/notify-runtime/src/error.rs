//! Error types for the runtime crate.

use thiserror::Error;

use notify_backend::BackendError;
use notify_core::VaultError;
use notify_models::SubscriberId;
use notify_persistence::PersistenceError;

/// Alert delivery failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The messaging platform rejected the request or was unreachable.
    #[error("delivery failed: {0}")]
    Failed(String),

    /// No destination is configured for this alert.
    #[error("no destination configured for {0}")]
    NoDestination(String),
}

/// Errors from the session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Stored credential could not be decrypted or encrypted.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Store read or write failed.
    #[error(transparent)]
    Store(#[from] PersistenceError),

    /// The token was rejected and no password is retained.
    #[error("subscriber {0} must run setup again")]
    ReauthRequired(SubscriberId),

    /// Neither a token nor a password credential is available.
    #[error("subscriber {id} has no usable credentials (missing {missing})")]
    MissingCredentials { id: SubscriberId, missing: String },
}

/// Errors from checking one subscriber.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Store(#[from] PersistenceError),
}

impl CheckError {
    /// Short static label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Session(SessionError::Backend(e)) | Self::Backend(e) => e.kind(),
            Self::Session(SessionError::Vault(VaultError::Decryption(_))) => "decryption",
            Self::Session(SessionError::Vault(_)) => "vault",
            Self::Session(SessionError::Store(_)) | Self::Store(_) => "store",
            Self::Session(SessionError::ReauthRequired(_)) => "reauth_required",
            Self::Session(SessionError::MissingCredentials { .. }) => "missing_credentials",
            Self::Delivery(_) => "delivery",
        }
    }

    /// Whether the subscriber needs manual re-setup before it can be
    /// checked again.
    pub fn needs_setup(&self) -> bool {
        matches!(
            self,
            Self::Session(SessionError::ReauthRequired(_))
                | Self::Session(SessionError::Vault(VaultError::Decryption(_)))
                | Self::Session(SessionError::MissingCredentials { .. })
        )
    }
}

/// Work queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The worker has stopped and no longer accepts jobs.
    #[error("job queue is closed")]
    Closed,
}

/// Errors from starting and stopping the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Runtime not started.
    #[error("runtime not started")]
    NotStarted,

    /// Runtime already started.
    #[error("runtime already started")]
    AlreadyStarted,

    /// Shutdown error.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

/// Result type for runtime lifecycle operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
