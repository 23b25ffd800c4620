//! Single-tenant startup: one process-wide account alerting a channel.

use tracing::{info, warn};

use notify_core::{AppConfig, CredentialVault};
use notify_models::{Destination, SubscriberId};
use notify_persistence::{CredentialPatch, UserStore};
use notify_runtime::SessionManager;

use crate::error::Result;

/// Upserts the broadcast subscriber for `RC_SERVER`/`RC_USER`/`RC_PASSWORD`.
///
/// The password is always retained so a rejected token is replaced by a
/// fresh login. If the first login fails the credentials are stored anyway
/// and the next polling cycle logs in. Returns the subscriber id, or
/// `None` when single-tenant mode is not configured.
pub async fn bootstrap_single_tenant(
    config: &AppConfig,
    store: &dyn UserStore,
    sessions: &SessionManager,
    vault: &CredentialVault,
) -> Result<Option<SubscriberId>> {
    let Some(creds) = &config.single_tenant else {
        return Ok(None);
    };
    let Some(channel) = &config.telegram_channel_id else {
        warn!("RC_SERVER is set but TELEGRAM_CHANNEL_ID is not, single-tenant alerts disabled");
        return Ok(None);
    };

    let id = SubscriberId::for_channel(channel);
    let existing = store.find_or_create(&id).await?;
    if existing.destination != Destination::Broadcast || !existing.enabled {
        let mut updated = existing.with_destination(Destination::Broadcast);
        updated.enabled = true;
        store.save(&updated).await?;
    }

    let server = creds.server.trim_end_matches('/');
    match sessions
        .connect(&id, server, &creds.user, &creds.password, true)
        .await
    {
        Ok(_) => info!(subscriber = %id, "single-tenant account connected"),
        Err(e) => {
            warn!(subscriber = %id, error = %e, "single-tenant login failed, will retry on next cycle");
            let patch = CredentialPatch::default()
                .with_login(server, creds.user.clone())
                .with_password(Some(vault.encrypt(&creds.password)?));
            store.update_credentials(&id, patch).await?;
        }
    }

    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use notify_backend::{BackendError, ChatBackend};
    use notify_models::{Session, SubscriptionRecord};
    use notify_persistence::FileUserStore;
    use tempfile::tempdir;

    struct FakeBackend {
        up: bool,
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn login(&self, _server: &str, _user: &str, _password: &str) -> notify_backend::Result<Session> {
            if self.up {
                Ok(Session::new("tok", "uid"))
            } else {
                Err(BackendError::Status(503))
            }
        }

        async fn fetch_subscriptions(
            &self,
            _server: &str,
            _session: &Session,
        ) -> notify_backend::Result<Vec<SubscriptionRecord>> {
            Ok(Vec::new())
        }
    }

    fn config(single_tenant: bool, channel: Option<&str>) -> AppConfig {
        let lookup = |key: &str| match key {
            "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
            "RC_TOKEN_SALT" => Some("salt".to_string()),
            "TELEGRAM_CHANNEL_ID" => channel.map(str::to_string),
            "RC_SERVER" if single_tenant => Some("https://chat.example.com/".to_string()),
            "RC_USER" if single_tenant => Some("bot".to_string()),
            "RC_PASSWORD" if single_tenant => Some("pw".to_string()),
            _ => None,
        };
        let mut config = AppConfig::from_lookup(lookup).unwrap();
        config.state_dir = PathBuf::from("unused");
        config
    }

    async fn run(config: &AppConfig, up: bool) -> (tempfile::TempDir, Arc<FileUserStore>, Option<SubscriberId>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileUserStore::new(dir.path()));
        let vault = Arc::new(CredentialVault::new("salt").unwrap());
        let sessions = SessionManager::new(
            Arc::new(FakeBackend { up }),
            store.clone() as Arc<dyn UserStore>,
            Arc::clone(&vault),
        );
        let id = bootstrap_single_tenant(config, store.as_ref(), &sessions, &vault)
            .await
            .unwrap();
        (dir, store, id)
    }

    #[tokio::test]
    async fn test_not_configured() {
        let (_dir, _store, id) = run(&config(false, Some("-100")), true).await;
        assert!(id.is_none());

        let (_dir, store, id) = run(&config(true, None), true).await;
        assert!(id.is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creates_broadcast_subscriber() {
        let (_dir, store, id) = run(&config(true, Some("-100123")), true).await;
        let id = id.unwrap();
        assert_eq!(id.as_str(), "channel--100123");

        let sub = store.get(&id).await.unwrap().unwrap();
        assert_eq!(sub.destination, Destination::Broadcast);
        assert_eq!(sub.rc_server.as_deref(), Some("https://chat.example.com"));
        assert!(sub.rc_token.is_some());
        assert!(sub.has_password());
    }

    #[tokio::test]
    async fn test_login_failure_keeps_password() {
        let (_dir, store, id) = run(&config(true, Some("@alerts")), false).await;
        let sub = store.get(&id.unwrap()).await.unwrap().unwrap();

        assert!(sub.rc_token.is_none());
        assert!(sub.has_password());
        assert!(sub.is_configured());
    }
}
