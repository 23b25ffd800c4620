//! UserStore trait definition.
//!
//! The runtime only talks to subscribers through this trait; the storage
//! technology behind it is an implementation detail. All writes are
//! last-writer-wins.

use async_trait::async_trait;

use notify_models::{EncryptedSecret, SetupState, Subscriber, SubscriberId};

use crate::error::Result;

/// Partial update of a subscriber's backend credentials.
///
/// `None` leaves a field untouched. The doubly optional fields can also be
/// cleared with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialPatch {
    pub server: Option<String>,
    pub user: Option<String>,
    pub token: Option<EncryptedSecret>,
    pub user_id: Option<String>,
    pub instance_id: Option<Option<String>>,
    pub password: Option<Option<EncryptedSecret>>,
}

impl CredentialPatch {
    /// A patch carrying a freshly issued session.
    pub fn session(
        token: EncryptedSecret,
        user_id: impl Into<String>,
        instance_id: Option<String>,
    ) -> Self {
        Self {
            token: Some(token),
            user_id: Some(user_id.into()),
            instance_id: Some(instance_id),
            ..Self::default()
        }
    }

    /// Also set the server and username.
    pub fn with_login(mut self, server: impl Into<String>, user: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self.user = Some(user.into());
        self
    }

    /// Set (or clear) the retained password.
    pub fn with_password(mut self, password: Option<EncryptedSecret>) -> Self {
        self.password = Some(password);
        self
    }

    /// Applies the patch. A new token clears the re-auth marker.
    pub fn apply(self, subscriber: &mut Subscriber) {
        if let Some(server) = self.server {
            subscriber.rc_server = Some(server);
        }
        if let Some(user) = self.user {
            subscriber.rc_user = Some(user);
        }
        if let Some(token) = self.token {
            subscriber.rc_token = Some(token);
            subscriber.needs_reauth = false;
        }
        if let Some(user_id) = self.user_id {
            subscriber.rc_user_id = Some(user_id);
        }
        if let Some(instance_id) = self.instance_id {
            subscriber.rc_instance_id = instance_id;
        }
        if let Some(password) = self.password {
            subscriber.rc_password = password;
        }
    }
}

/// Storage for subscribers, their watermarks and wizard state.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns the subscriber with this external id, creating an enabled
    /// one if none exists. Identity is unique.
    async fn find_or_create(&self, id: &SubscriberId) -> Result<Subscriber>;

    /// Inserts or replaces a full record.
    async fn save(&self, subscriber: &Subscriber) -> Result<()>;

    /// Loads one subscriber.
    async fn get(&self, id: &SubscriberId) -> Result<Option<Subscriber>>;

    /// All enabled subscribers, in stable listing order.
    async fn list_enabled(&self) -> Result<Vec<Subscriber>>;

    /// All subscribers, in stable listing order.
    async fn list_all(&self) -> Result<Vec<Subscriber>>;

    /// Applies a credential patch and returns the updated record.
    async fn update_credentials(&self, id: &SubscriberId, patch: CredentialPatch) -> Result<Subscriber>;

    /// Stores a new watermark.
    async fn update_watermark(&self, id: &SubscriberId, value: u64) -> Result<()>;

    /// Soft enable/disable.
    async fn set_enabled(&self, id: &SubscriberId, enabled: bool) -> Result<()>;

    /// Marks or clears the manual re-setup flag.
    async fn set_needs_reauth(&self, id: &SubscriberId, needs_reauth: bool) -> Result<()>;

    /// Stores wizard state.
    async fn set_setup_state(&self, id: &SubscriberId, state: SetupState) -> Result<()>;

    /// Loads wizard state, if a wizard is in progress.
    async fn get_setup_state(&self, id: &SubscriberId) -> Result<Option<SetupState>>;

    /// Drops wizard state.
    async fn clear_setup_state(&self, id: &SubscriberId) -> Result<()>;
}
