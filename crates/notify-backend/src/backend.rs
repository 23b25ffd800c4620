//! ChatBackend trait definition.

use async_trait::async_trait;

use notify_models::{Session, SubscriptionRecord};

use crate::error::Result;

/// A chat backend that can issue sessions and report per-conversation
/// unread state.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Logs in with a username and password.
    ///
    /// Fails with [`BackendError::Auth`](crate::BackendError::Auth) if the
    /// credentials are rejected or the response carries no token/user id.
    async fn login(&self, server: &str, user: &str, password: &str) -> Result<Session>;

    /// Fetches the raw subscription records for the session's user.
    ///
    /// A 401 surfaces immediately as
    /// [`BackendError::AuthExpired`](crate::BackendError::AuthExpired).
    async fn fetch_subscriptions(&self, server: &str, session: &Session) -> Result<Vec<SubscriptionRecord>>;
}
