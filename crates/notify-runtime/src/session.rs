//! Backend session lifecycle.
//!
//! Per subscriber: `Unauthenticated -> Authenticated -> (401) -> Unauthenticated`.
//! Live sessions are cached in memory; only the encrypted token is
//! persisted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use notify_backend::ChatBackend;
use notify_core::CredentialVault;
use notify_models::{Session, Subscriber, SubscriberId};
use notify_persistence::{CredentialPatch, UserStore};

use crate::error::SessionError;

type Result<T> = std::result::Result<T, SessionError>;

/// A decrypted credential from which a session can be obtained.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Username and password; a session is obtained by logging in.
    Password {
        server: String,
        user: String,
        password: String,
    },
    /// A pre-issued token; used as-is.
    Token {
        server: String,
        user_id: String,
        token: String,
        instance_id: Option<String>,
    },
}

impl Credential {
    pub fn server(&self) -> &str {
        match self {
            Self::Password { server, .. } | Self::Token { server, .. } => server,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { server, user, .. } => f
                .debug_struct("Password")
                .field("server", server)
                .field("user", user)
                .finish_non_exhaustive(),
            Self::Token { server, user_id, .. } => f
                .debug_struct("Token")
                .field("server", server)
                .field("user_id", user_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Owns backend sessions for all subscribers.
pub struct SessionManager {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn UserStore>,
    vault: Arc<CredentialVault>,
    cache: Mutex<HashMap<SubscriberId, Session>>,
    retain_password: bool,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn UserStore>,
        vault: Arc<CredentialVault>,
    ) -> Self {
        Self {
            backend,
            store,
            vault,
            cache: Mutex::new(HashMap::new()),
            retain_password: false,
        }
    }

    /// Keep an encrypted password from interactive logins so a rejected
    /// token can be replaced without user action.
    pub fn with_retain_password(mut self, retain: bool) -> Self {
        self.retain_password = retain;
        self
    }

    pub fn retains_passwords(&self) -> bool {
        self.retain_password
    }

    /// Obtains a session for a credential.
    pub async fn resolve_session(&self, credential: &Credential) -> Result<Session> {
        match credential {
            Credential::Password { server, user, password } => {
                Ok(self.backend.login(server, user, password).await?)
            }
            Credential::Token {
                user_id,
                token,
                instance_id,
                ..
            } => Ok(Session::new(token.clone(), user_id.clone()).with_instance_id(instance_id.clone())),
        }
    }

    /// Returns a usable session for the subscriber.
    ///
    /// Uses the cached session if there is one, then the stored token, and
    /// finally a login with the retained password. Tokens issued by a login
    /// are persisted encrypted.
    pub async fn ensure_valid_token(&self, subscriber: &Subscriber) -> Result<Session> {
        if let Some(session) = self.cache.lock().await.get(&subscriber.id) {
            return Ok(session.clone());
        }

        let credential = self.stored_credential(subscriber)?;
        let session = self.resolve_session(&credential).await?;
        if matches!(credential, Credential::Password { .. }) {
            self.persist_session(&subscriber.id, &session).await?;
        }

        self.cache.lock().await.insert(subscriber.id.clone(), session.clone());
        debug!(subscriber = %subscriber.id, user = session.user_label(), "session ready");
        Ok(session)
    }

    /// Handles a rejected token.
    ///
    /// Clears the cached session, then logs in again if a password is
    /// retained. Otherwise the subscriber is flagged for manual re-setup
    /// and [`SessionError::ReauthRequired`] is returned.
    pub async fn refresh(&self, subscriber: &Subscriber) -> Result<Session> {
        self.invalidate(&subscriber.id).await;

        match self.password_credential(subscriber)? {
            Some(credential) => {
                info!(subscriber = %subscriber.id, "session expired, logging in again");
                let session = self.resolve_session(&credential).await?;
                self.persist_session(&subscriber.id, &session).await?;
                self.cache.lock().await.insert(subscriber.id.clone(), session.clone());
                Ok(session)
            }
            None => {
                warn!(subscriber = %subscriber.id, "session expired and no password is retained, setup required");
                self.store.set_needs_reauth(&subscriber.id, true).await?;
                Err(SessionError::ReauthRequired(subscriber.id.clone()))
            }
        }
    }

    /// Logs in with fresh credentials and stores the result.
    ///
    /// With `retain_password` the password is kept encrypted; otherwise any
    /// previously retained password is cleared.
    pub async fn connect(
        &self,
        id: &SubscriberId,
        server: &str,
        user: &str,
        password: &str,
        retain_password: bool,
    ) -> Result<Subscriber> {
        self.invalidate(id).await;

        let session = self.backend.login(server, user, password).await?;
        let retained = if retain_password {
            Some(self.vault.encrypt(password)?)
        } else {
            None
        };
        let patch = CredentialPatch::session(
            self.vault.encrypt(&session.auth_token)?,
            session.user_id.clone(),
            session.instance_id.clone(),
        )
        .with_login(server.trim_end_matches('/'), user)
        .with_password(retained);

        let subscriber = self.store.update_credentials(id, patch).await?;
        self.cache.lock().await.insert(id.clone(), session);
        info!(subscriber = %id, "backend credentials updated");
        Ok(subscriber)
    }

    /// Drops the cached session.
    pub async fn invalidate(&self, id: &SubscriberId) {
        if self.cache.lock().await.remove(id).is_some() {
            debug!(subscriber = %id, "session invalidated");
        }
    }

    async fn persist_session(&self, id: &SubscriberId, session: &Session) -> Result<()> {
        let patch = CredentialPatch::session(
            self.vault.encrypt(&session.auth_token)?,
            session.user_id.clone(),
            session.instance_id.clone(),
        );
        self.store.update_credentials(id, patch).await?;
        Ok(())
    }

    /// Stored token first, retained password second.
    fn stored_credential(&self, subscriber: &Subscriber) -> Result<Credential> {
        if let (Some(server), Some(token), Some(user_id)) = (
            subscriber.rc_server.as_deref().filter(|s| !s.is_empty()),
            subscriber.rc_token.as_ref(),
            subscriber.rc_user_id.as_deref().filter(|s| !s.is_empty()),
        ) {
            return Ok(Credential::Token {
                server: server.to_string(),
                user_id: user_id.to_string(),
                token: self.vault.decrypt(token)?,
                instance_id: subscriber.rc_instance_id.clone(),
            });
        }

        self.password_credential(subscriber)?
            .ok_or_else(|| SessionError::MissingCredentials {
                id: subscriber.id.clone(),
                missing: subscriber.missing_fields().join(", "),
            })
    }

    fn password_credential(&self, subscriber: &Subscriber) -> Result<Option<Credential>> {
        match (
            subscriber.rc_server.as_deref().filter(|s| !s.is_empty()),
            subscriber.rc_user.as_deref(),
            subscriber.rc_password.as_ref(),
        ) {
            (Some(server), Some(user), Some(password)) => Ok(Some(Credential::Password {
                server: server.to_string(),
                user: user.to_string(),
                password: self.vault.decrypt(password)?,
            })),
            _ => Ok(None),
        }
    }
}
