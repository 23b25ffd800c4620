//! Process wiring: builds every component from an [`AppConfig`].

use std::sync::Arc;

use teloxide::Bot;
use tracing::{debug, info};

use notify_backend::{ChatBackend, PachcaClient, RocketChatClient};
use notify_core::{AppConfig, CredentialVault, PachcaConfig};
use notify_persistence::{FileUserStore, UserStore};
use notify_runtime::{
    CycleOutcome, LocalJobQueue, NotificationGateway, NotifyRuntime, PachcaWatcher,
    PachcaWatcherConfig, PollingScheduler, SchedulerConfig, SessionManager, UnreadChecker,
    WatchOutcome,
};

use crate::bootstrap::bootstrap_single_tenant;
use crate::bot::NotifyBot;
use crate::error::Result;
use crate::gateway::TelegramGateway;
use crate::state::create_shared_state;

/// Everything the binary runs.
pub struct App {
    pub bot: NotifyBot,
    pub scheduler: Arc<PollingScheduler>,
    pub queue: Arc<LocalJobQueue>,
    pub pachca: Option<Arc<PachcaWatcher>>,
}

impl App {
    /// Builds the components and runs the single-tenant bootstrap. Must be
    /// called inside a tokio runtime.
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let vault = Arc::new(CredentialVault::new(&config.token_secret)?);
        let store: Arc<dyn UserStore> = Arc::new(FileUserStore::new(config.store_dir()));
        let backend: Arc<dyn ChatBackend> = Arc::new(RocketChatClient::new()?);

        let sessions = Arc::new(
            SessionManager::new(Arc::clone(&backend), Arc::clone(&store), Arc::clone(&vault))
                .with_retain_password(config.retain_password),
        );

        let bot = Bot::new(&config.telegram_bot_token);
        let gateway: Arc<dyn NotificationGateway> = Arc::new(TelegramGateway::new(
            bot.clone(),
            config.telegram_channel_id.as_deref(),
        ));

        let checker = Arc::new(UnreadChecker::new(
            backend,
            Arc::clone(&sessions),
            Arc::clone(&store),
            Arc::clone(&gateway),
        ));
        let queue = Arc::new(LocalJobQueue::start(checker.clone()));
        let scheduler = Arc::new(PollingScheduler::new(
            SchedulerConfig::new()
                .with_poll_interval(config.polling_interval)
                .with_queue_threshold(config.queue_threshold),
            Arc::clone(&store),
            checker,
            queue.clone(),
        ));

        if let Some(id) = bootstrap_single_tenant(config, store.as_ref(), &sessions, &vault).await? {
            info!(subscriber = %id, "single-tenant subscriber ready");
        }

        let pachca = match &config.pachca {
            Some(pachca) => Some(Arc::new(pachca_watcher(pachca, Arc::clone(&gateway))?)),
            None => None,
        };

        let state = create_shared_state(store, sessions);
        debug!(pachca = pachca.is_some(), "components built");

        Ok(Self {
            bot: NotifyBot::new(bot, state),
            scheduler,
            queue,
            pachca,
        })
    }

    /// Background runtime for the polling loops.
    pub fn runtime(&self) -> NotifyRuntime {
        let runtime = NotifyRuntime::new(Arc::clone(&self.scheduler));
        match &self.pachca {
            Some(watcher) => runtime.with_pachca(Arc::clone(watcher)),
            None => runtime,
        }
    }

    /// One cycle of every loop, waiting for queued jobs to finish.
    pub async fn run_once(&self) -> (CycleOutcome, Option<WatchOutcome>) {
        let cycle = self.scheduler.tick().await;
        self.queue.wait_idle().await;
        let pachca = match &self.pachca {
            Some(watcher) => Some(watcher.check().await),
            None => None,
        };
        (cycle, pachca)
    }
}

fn pachca_watcher(
    config: &PachcaConfig,
    gateway: Arc<dyn NotificationGateway>,
) -> Result<PachcaWatcher> {
    let client = PachcaClient::new(config.base_url.clone(), config.access_token.clone())?
        .with_internal_api(config.internal_base_url.clone(), config.internal_cookie.clone());

    let watcher_config = PachcaWatcherConfig::new(config.chat_ids.clone(), config.user_id.clone())
        .with_poll_interval(config.polling_interval);

    info!(
        chats = config.chat_ids.len(),
        internal_api = config.internal_cookie.is_some(),
        "pachca watcher enabled"
    );
    Ok(PachcaWatcher::new(Arc::new(client), gateway, watcher_config))
}
