//! File-backed subscriber store.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use notify_models::{SetupState, Subscriber, SubscriberId};

use crate::atomic::{atomic_write_json, ensure_dir, read_json_optional};
use crate::error::{PersistenceError, Result};
use crate::user_store::{CredentialPatch, UserStore};

/// Stores each subscriber as an individual JSON file:
/// ```text
/// base_path/
/// └── subscribers/
///     ├── 12345.json
///     └── channel-alerts.json
/// ```
///
/// The file name is the external id, which is what makes identity unique.
/// Read-modify-write operations are serialized within the process.
pub struct FileUserStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileUserStore {
    /// Creates a store rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn subscribers_dir(&self) -> PathBuf {
        self.base_path.join("subscribers")
    }

    fn subscriber_path(&self, id: &SubscriberId) -> Result<PathBuf> {
        if !id.is_valid() {
            return Err(PersistenceError::InvalidData(format!(
                "subscriber id {:?} is not storage safe",
                id.as_str()
            )));
        }
        Ok(self.subscribers_dir().join(format!("{}.json", id)))
    }

    fn load(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        read_json_optional(&self.subscriber_path(id)?)
    }

    fn store(&self, subscriber: &Subscriber) -> Result<()> {
        let path = self.subscriber_path(&subscriber.id)?;
        atomic_write_json(&path, subscriber)
    }

    fn load_all(&self) -> Result<Vec<Subscriber>> {
        let dir = self.subscribers_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let read_err = |source| PersistenceError::ReadError {
            path: dir.clone(),
            source,
        };

        let mut subscribers = Vec::new();
        for entry in fs::read_dir(&dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match read_json_optional::<Subscriber>(&path) {
                Ok(Some(subscriber)) => subscribers.push(subscriber),
                Ok(None) => {}
                Err(e) => {
                    // One corrupt record must not hide the rest.
                    warn!(path = %path.display(), error = %e, "skipping unreadable subscriber record");
                }
            }
        }

        subscribers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(subscribers)
    }

    /// Loads, mutates and stores one record under the write lock.
    async fn modify<F>(&self, id: &SubscriberId, f: F) -> Result<Subscriber>
    where
        F: FnOnce(&mut Subscriber) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut subscriber = self
            .load(id)?
            .ok_or_else(|| PersistenceError::subscriber_not_found(id))?;
        f(&mut subscriber);
        subscriber.touch();
        self.store(&subscriber)?;
        Ok(subscriber)
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn find_or_create(&self, id: &SubscriberId) -> Result<Subscriber> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.load(id)? {
            return Ok(existing);
        }
        ensure_dir(&self.subscribers_dir())?;
        let subscriber = Subscriber::new(id.clone());
        self.store(&subscriber)?;
        debug!(subscriber = %id, "created subscriber");
        Ok(subscriber)
    }

    async fn save(&self, subscriber: &Subscriber) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store(subscriber)
    }

    async fn get(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        self.load(id)
    }

    async fn list_enabled(&self) -> Result<Vec<Subscriber>> {
        Ok(self.load_all()?.into_iter().filter(|s| s.enabled).collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscriber>> {
        self.load_all()
    }

    async fn update_credentials(&self, id: &SubscriberId, patch: CredentialPatch) -> Result<Subscriber> {
        self.modify(id, move |s| patch.apply(s)).await
    }

    async fn update_watermark(&self, id: &SubscriberId, value: u64) -> Result<()> {
        self.modify(id, |s| s.last_unread = value).await.map(|_| ())
    }

    async fn set_enabled(&self, id: &SubscriberId, enabled: bool) -> Result<()> {
        self.modify(id, |s| s.enabled = enabled).await.map(|_| ())
    }

    async fn set_needs_reauth(&self, id: &SubscriberId, needs_reauth: bool) -> Result<()> {
        self.modify(id, |s| s.needs_reauth = needs_reauth).await.map(|_| ())
    }

    async fn set_setup_state(&self, id: &SubscriberId, state: SetupState) -> Result<()> {
        self.modify(id, move |s| s.setup = Some(state)).await.map(|_| ())
    }

    async fn get_setup_state(&self, id: &SubscriberId) -> Result<Option<SetupState>> {
        Ok(self.load(id)?.and_then(|s| s.setup))
    }

    async fn clear_setup_state(&self, id: &SubscriberId) -> Result<()> {
        self.modify(id, |s| s.setup = None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_models::{EncryptedSecret, SetupStep};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());
        let id = SubscriberId::new("100");

        let first = store.find_or_create(&id).await.unwrap();
        store.update_watermark(&id, 4).await.unwrap();
        let second = store.find_or_create(&id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.last_unread, 4);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_enabled_filters_disabled() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());

        for id in ["1", "2", "3"] {
            store.find_or_create(&SubscriberId::new(id)).await.unwrap();
        }
        store.set_enabled(&SubscriberId::new("2"), false).await.unwrap();

        let enabled: Vec<String> = store
            .list_enabled()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(enabled, vec!["1", "3"]);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_credentials() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());
        let id = SubscriberId::new("7");
        store.find_or_create(&id).await.unwrap();
        store.set_needs_reauth(&id, true).await.unwrap();

        let patch = CredentialPatch::session(
            EncryptedSecret::from_ciphertext("n:t:c"),
            "rc-user",
            Some("inst".to_string()),
        )
        .with_login("https://chat.example.com", "john");
        let updated = store.update_credentials(&id, patch).await.unwrap();

        assert_eq!(updated.rc_server.as_deref(), Some("https://chat.example.com"));
        assert_eq!(updated.rc_instance_id.as_deref(), Some("inst"));
        assert!(!updated.needs_reauth);
        assert_eq!(store.get(&id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_update_missing_subscriber() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());

        let result = store.update_watermark(&SubscriberId::new("404"), 1).await;
        assert!(matches!(result, Err(PersistenceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_setup_state_lifecycle() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());
        let id = SubscriberId::new("9");
        store.find_or_create(&id).await.unwrap();

        assert!(store.get_setup_state(&id).await.unwrap().is_none());

        store
            .set_setup_state(&id, SetupState::start().with_server("https://a.example"))
            .await
            .unwrap();
        let state = store.get_setup_state(&id).await.unwrap().unwrap();
        assert_eq!(state.step, SetupStep::User);

        store.clear_setup_state(&id).await.unwrap();
        assert!(store.get_setup_state(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_id() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());

        let result = store.find_or_create(&SubscriberId::new("../escape")).await;
        assert!(matches!(result, Err(PersistenceError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let dir = tempdir().unwrap();
        let store = FileUserStore::new(dir.path());
        store.find_or_create(&SubscriberId::new("1")).await.unwrap();
        fs::write(dir.path().join("subscribers/2.json"), "{broken").unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
