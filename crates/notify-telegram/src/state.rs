//! State shared by the bot handlers.

use std::sync::Arc;

use teloxide::types::ChatId;
use tracing::{info, warn};

use notify_models::{SetupState, Subscriber, SubscriberId};
use notify_persistence::UserStore;
use notify_runtime::SessionManager;

use crate::error::{Result, TelegramError};
use crate::wizard::{self, WizardStep};

/// What a wizard message led to.
#[derive(Debug)]
pub enum WizardReply {
    /// No wizard is running for this chat.
    Inactive,
    /// Ask for the next field.
    Prompt(&'static str),
    /// Input rejected; ask again.
    Rejected(String),
    /// Login succeeded and credentials are stored.
    Connected(Subscriber),
    /// The wizard was reset and must be started again.
    Restart,
}

/// Bot state: the subscriber store and the session manager.
pub struct BotState {
    store: Arc<dyn UserStore>,
    sessions: Arc<SessionManager>,
}

impl BotState {
    pub fn new(store: Arc<dyn UserStore>, sessions: Arc<SessionManager>) -> Self {
        Self { store, sessions }
    }

    /// Subscriber id for a Telegram chat.
    pub fn subscriber_id(chat_id: ChatId) -> SubscriberId {
        SubscriberId::new(chat_id.0.to_string())
    }

    /// Registers the chat, or re-enables it after `/stop`.
    pub async fn start(&self, id: &SubscriberId) -> Result<Subscriber> {
        let subscriber = self.store.find_or_create(id).await?;
        if subscriber.enabled {
            return Ok(subscriber);
        }
        self.store.set_enabled(id, true).await?;
        info!(subscriber = %id, "subscriber re-enabled");
        Ok(self.store.get(id).await?.unwrap_or(subscriber))
    }

    /// Starts (or restarts) the setup wizard.
    pub async fn begin_setup(&self, id: &SubscriberId) -> Result<()> {
        self.store.find_or_create(id).await?;
        self.store.set_setup_state(id, SetupState::start()).await?;
        Ok(())
    }

    /// Drops wizard state. Returns whether a wizard was running.
    pub async fn cancel_setup(&self, id: &SubscriberId) -> Result<bool> {
        if self.store.get_setup_state(id).await?.is_none() {
            return Ok(false);
        }
        self.store.clear_setup_state(id).await?;
        Ok(true)
    }

    /// Feeds a plain text message into the wizard.
    ///
    /// The wizard state is cleared before the login attempt, so a failed
    /// login ends the wizard as well.
    pub async fn wizard_input(&self, id: &SubscriberId, text: &str) -> Result<WizardReply> {
        let Some(state) = self.store.get_setup_state(id).await? else {
            return Ok(WizardReply::Inactive);
        };

        match wizard::advance(&state, text) {
            WizardStep::Next { state, prompt } => {
                self.store.set_setup_state(id, state).await?;
                Ok(WizardReply::Prompt(prompt))
            }
            WizardStep::Rejected(reason) => Ok(WizardReply::Rejected(reason)),
            WizardStep::Restart => {
                warn!(subscriber = %id, "inconsistent setup state, resetting");
                self.store.clear_setup_state(id).await?;
                Ok(WizardReply::Restart)
            }
            WizardStep::Complete {
                server,
                user,
                password,
            } => {
                self.store.clear_setup_state(id).await?;
                let subscriber = self.connect(id, &server, &user, &password).await?;
                Ok(WizardReply::Connected(subscriber))
            }
        }
    }

    /// Logs in with the given credentials and stores the session.
    pub async fn login(
        &self,
        id: &SubscriberId,
        server: &str,
        user: &str,
        password: &str,
    ) -> Result<Subscriber> {
        let server = wizard::normalize_server(server).map_err(TelegramError::InvalidInput)?;
        if user.trim().is_empty() || password.is_empty() {
            return Err(TelegramError::InvalidInput(
                "Usage: /login <server> <user> <password>".to_string(),
            ));
        }
        self.store.find_or_create(id).await?;
        self.connect(id, &server, user.trim(), password).await
    }

    async fn connect(
        &self,
        id: &SubscriberId,
        server: &str,
        user: &str,
        password: &str,
    ) -> Result<Subscriber> {
        let retain = self.sessions.retains_passwords();
        Ok(self.sessions.connect(id, server, user, password, retain).await?)
    }

    /// Soft-disables alerts. Returns false if the chat never registered.
    pub async fn stop(&self, id: &SubscriberId) -> Result<bool> {
        if self.store.get(id).await?.is_none() {
            return Ok(false);
        }
        self.store.set_enabled(id, false).await?;
        info!(subscriber = %id, "subscriber disabled");
        Ok(true)
    }

    pub async fn subscriber(&self, id: &SubscriberId) -> Result<Option<Subscriber>> {
        Ok(self.store.get(id).await?)
    }
}

/// Status report for `/status`. Contains no secrets.
pub fn status_text(subscriber: Option<&Subscriber>) -> String {
    let Some(s) = subscriber else {
        return "Not registered. Send /start first.".to_string();
    };

    let mut lines = vec![
        format!("Alerts: {}", if s.enabled { "on" } else { "off" }),
        format!(
            "Server: {}",
            s.rc_server.as_deref().unwrap_or("not set")
        ),
        format!("User: {}", s.rc_user.as_deref().unwrap_or("not set")),
        format!("Last unread: {}", s.last_unread),
    ];

    if s.needs_reauth {
        lines.push("⚠️ The server rejected the saved login. Run /setup again.".to_string());
    } else if !s.is_configured() {
        lines.push("Not connected yet. Run /setup.".to_string());
    }
    if s.setup.is_some() {
        lines.push("Setup in progress.".to_string());
    }

    lines.join("\n")
}

/// Splits `/login` arguments into server, user and password. The password
/// is everything after the user, so it may contain spaces.
pub fn parse_login_args(args: &str) -> Option<(&str, &str, &str)> {
    let args = args.trim_start();
    let (server, rest) = args.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (user, password) = rest.split_once(char::is_whitespace)?;
    let password = password.trim();
    if password.is_empty() {
        return None;
    }
    Some((server, user, password))
}

/// Create a shared state wrapped in Arc for use across handlers.
pub fn create_shared_state(
    store: Arc<dyn UserStore>,
    sessions: Arc<SessionManager>,
) -> Arc<BotState> {
    Arc::new(BotState::new(store, sessions))
}
