//! Per-subscriber unread check.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use notify_backend::ChatBackend;
use notify_core::aggregate;
use notify_models::{Subscriber, UnreadSnapshot};
use notify_persistence::UserStore;

use crate::alert::{Alert, NotificationGateway};
use crate::error::CheckError;
use crate::queue::{Job, JobHandler, JobKind};
use crate::session::SessionManager;

/// Why a subscriber was not checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Required credential fields are absent.
    MissingFields(Vec<&'static str>),
    /// The token was rejected earlier and setup must be repeated.
    NeedsReauth,
    /// Disabled after the job was queued.
    Disabled,
    /// Removed after the job was queued.
    NotFound,
}

/// Result of checking one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Skipped(SkipReason),
    /// Total equals the watermark.
    Unchanged { total: u64 },
    /// Total rose; an alert was sent and the watermark raised.
    Alerted { previous: u64, total: u64 },
    /// Total fell; the watermark was lowered without an alert.
    Lowered { previous: u64, total: u64 },
}

impl CheckOutcome {
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alerted { .. })
    }
}

/// Runs fetch, aggregate, compare, notify and persist for one subscriber.
pub struct UnreadChecker {
    backend: Arc<dyn ChatBackend>,
    sessions: Arc<SessionManager>,
    store: Arc<dyn UserStore>,
    gateway: Arc<dyn NotificationGateway>,
}

impl UnreadChecker {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sessions: Arc<SessionManager>,
        store: Arc<dyn UserStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            backend,
            sessions,
            store,
            gateway,
        }
    }

    /// Checks one subscriber.
    ///
    /// The watermark is raised only after the alert was delivered; a failed
    /// send leaves it in place so the next cycle alerts again.
    pub async fn check(&self, subscriber: &Subscriber) -> Result<CheckOutcome, CheckError> {
        if subscriber.needs_reauth {
            warn!(subscriber = %subscriber.id, "skipping subscriber until setup is repeated");
            return Ok(CheckOutcome::Skipped(SkipReason::NeedsReauth));
        }
        let server = match subscriber.rc_server.as_deref() {
            Some(server) if subscriber.is_configured() => server,
            _ => {
                let missing = subscriber.missing_fields();
                warn!(subscriber = %subscriber.id, missing = ?missing, "skipping subscriber with incomplete credentials");
                return Ok(CheckOutcome::Skipped(SkipReason::MissingFields(missing)));
            }
        };

        let snapshot = self.fetch_snapshot(subscriber, server).await?;
        let previous = subscriber.last_unread;
        let total = snapshot.total;
        debug!(
            subscriber = %subscriber.id,
            total,
            previous,
            channels = snapshot.channels,
            im = snapshot.im,
            groups = snapshot.groups,
            "unread snapshot"
        );

        match total.cmp(&previous) {
            Ordering::Greater => {
                self.gateway
                    .send_alert(&Alert::rocket_chat(subscriber.destination, snapshot))
                    .await?;
                self.store.update_watermark(&subscriber.id, total).await?;
                info!(subscriber = %subscriber.id, previous, total, "unread alert sent");
                Ok(CheckOutcome::Alerted { previous, total })
            }
            Ordering::Less => {
                self.store.update_watermark(&subscriber.id, total).await?;
                debug!(subscriber = %subscriber.id, previous, total, "watermark lowered");
                Ok(CheckOutcome::Lowered { previous, total })
            }
            Ordering::Equal => Ok(CheckOutcome::Unchanged { total }),
        }
    }

    /// Fetches and aggregates, re-authenticating once on a rejected token.
    async fn fetch_snapshot(&self, subscriber: &Subscriber, server: &str) -> Result<UnreadSnapshot, CheckError> {
        let session = self.sessions.ensure_valid_token(subscriber).await?;
        let records = match self.backend.fetch_subscriptions(server, &session).await {
            Ok(records) => records,
            Err(e) if e.is_auth_expired() => {
                let session = self.sessions.refresh(subscriber).await?;
                self.backend.fetch_subscriptions(server, &session).await?
            }
            Err(e) => return Err(e.into()),
        };
        Ok(aggregate(&records))
    }
}

#[async_trait]
impl JobHandler for UnreadChecker {
    async fn handle(&self, job: &Job) -> Result<(), CheckError> {
        let JobKind::CheckUnread { subscriber_ref } = &job.kind;
        let outcome = match self.store.get(subscriber_ref).await? {
            Some(subscriber) if subscriber.enabled => match self.check(&subscriber).await {
                Ok(outcome) => outcome,
                Err(e) if e.needs_setup() => {
                    error!(subscriber = %subscriber_ref, kind = e.kind(), error = %e, "check failed, subscriber requires setup");
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
            Some(_) => CheckOutcome::Skipped(SkipReason::Disabled),
            None => {
                warn!(subscriber = %subscriber_ref, "queued subscriber no longer exists");
                CheckOutcome::Skipped(SkipReason::NotFound)
            }
        };
        debug!(job = %job.id, subscriber = %subscriber_ref, outcome = ?outcome, "check job done");
        Ok(())
    }
}
