//! Process-wide unread watcher for Pachca.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use notify_backend::{BackendError, PachcaApi, DEFAULT_MESSAGE_LIMIT};

use crate::alert::{Alert, ChatUnread, NotificationGateway};
use crate::guard::CycleGate;

/// Pachca watcher settings.
#[derive(Debug, Clone)]
pub struct PachcaWatcherConfig {
    pub chat_ids: Vec<String>,
    /// The watching user; their own and already read messages don't count.
    pub user_id: Option<String>,
    pub poll_interval: Duration,
    pub message_limit: u32,
}

impl PachcaWatcherConfig {
    pub fn new(chat_ids: Vec<String>, user_id: Option<String>) -> Self {
        Self {
            chat_ids,
            user_id,
            poll_interval: Duration::from_secs(5 * 60),
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// What one watcher pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A previous pass was still running, or nothing is watched.
    Skipped,
    Checked { total: u64, alerted: bool },
    Failed(String),
}

/// Polls watched Pachca chats and alerts the broadcast destination when
/// the unread total rises.
///
/// Two modes: with the internal API the total is the number of watched
/// chats flagged unread; otherwise each chat's recent messages are
/// counted unless authored or read by the configured user.
pub struct PachcaWatcher {
    api: Arc<dyn PachcaApi>,
    gateway: Arc<dyn NotificationGateway>,
    config: PachcaWatcherConfig,
    gate: CycleGate,
    last_total: AtomicU64,
}

impl PachcaWatcher {
    pub fn new(
        api: Arc<dyn PachcaApi>,
        gateway: Arc<dyn NotificationGateway>,
        config: PachcaWatcherConfig,
    ) -> Self {
        Self {
            api,
            gateway,
            config,
            gate: CycleGate::new(),
            last_total: AtomicU64::new(0),
        }
    }

    /// Current in-memory watermark.
    pub fn last_total(&self) -> u64 {
        self.last_total.load(Ordering::Acquire)
    }

    /// Runs one pass unless one is already in flight.
    ///
    /// In message mode a chat whose fetch fails counts as zero for the pass,
    /// which lowers the watermark; its messages alert again once the chat is
    /// readable.
    pub async fn check(&self) -> WatchOutcome {
        let Some(_guard) = self.gate.try_enter() else {
            return WatchOutcome::Skipped;
        };
        if self.config.chat_ids.is_empty() {
            warn!("no pachca chats configured, nothing to watch");
            return WatchOutcome::Skipped;
        }

        let alert = if self.api.can_use_internal_api() {
            match self.unread_chats().await {
                Ok(chats) => Alert::pachca_chats(chats),
                Err(e) => {
                    error!(kind = e.kind(), error = %e, "failed to fetch pachca unread chats");
                    return WatchOutcome::Failed(e.to_string());
                }
            }
        } else {
            let chats = self.unread_messages().await;
            let total = chats.iter().map(|c| c.unread).sum();
            Alert::pachca_messages(total, chats)
        };

        let total = alert.total;
        let previous = self.last_total();
        let alerted = total > previous;
        if alerted {
            if let Err(e) = self.gateway.send_alert(&alert).await {
                warn!(error = %e, total, "failed to deliver pachca alert");
                return WatchOutcome::Failed(e.to_string());
            }
            info!(previous, total, "pachca alert sent");
        }
        self.last_total.store(total, Ordering::Release);
        WatchOutcome::Checked { total, alerted }
    }

    async fn unread_chats(&self) -> Result<Vec<String>, BackendError> {
        let unread: HashSet<String> = self.api.get_unread_chat_ids().await?.into_iter().collect();
        Ok(self
            .config
            .chat_ids
            .iter()
            .filter(|id| unread.contains(*id))
            .cloned()
            .collect())
    }

    /// Per-chat unread counts. A failing chat is logged and left out.
    async fn unread_messages(&self) -> Vec<ChatUnread> {
        let mut chats = Vec::with_capacity(self.config.chat_ids.len());
        for chat_id in &self.config.chat_ids {
            match self.chat_unread(chat_id).await {
                Ok(unread) => chats.push(ChatUnread {
                    chat_id: chat_id.clone(),
                    unread,
                }),
                Err(e) => warn!(chat = %chat_id, kind = e.kind(), error = %e, "failed to check pachca chat"),
            }
        }
        chats
    }

    async fn chat_unread(&self, chat_id: &str) -> Result<u64, BackendError> {
        let user_id = self.config.user_id.as_deref();
        let messages = self.api.get_chat_messages(chat_id, self.config.message_limit).await?;

        let mut unread = 0;
        for message in messages.iter().filter(|m| !m.id.is_empty()) {
            if user_id.is_some() && message.author_id.as_deref() == user_id {
                continue;
            }
            let readers = self.api.get_message_readers(chat_id, &message.id).await?;
            let read = user_id.is_some_and(|uid| readers.iter().any(|r| r.user_id == uid));
            if !read {
                unread += 1;
            }
        }
        debug!(chat = chat_id, unread, "pachca chat checked");
        Ok(unread)
    }

    /// Runs passes until shutdown is signalled. The first pass starts
    /// immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            chats = self.config.chat_ids.len(),
            interval_secs = self.config.poll_interval.as_secs(),
            internal_api = self.api.can_use_internal_api(),
            "pachca polling started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let watcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        watcher.check().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("pachca watcher received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("pachca polling stopped");
    }
}
