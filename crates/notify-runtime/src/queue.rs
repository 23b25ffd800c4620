//! Work queue for large polling batches.
//!
//! Jobs carry only a subscriber reference; the worker reloads the
//! subscriber when the job runs, so a queued job never acts on stale
//! credentials or watermarks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::sleep;
use tracing::{debug, error, warn};
use uuid::Uuid;

use notify_models::SubscriberId;

use crate::error::{CheckError, QueueError};

/// What a job does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum JobKind {
    /// Check one subscriber's unread count.
    CheckUnread {
        #[serde(rename = "subscriberRef")]
        subscriber_ref: SubscriberId,
    },
}

/// Retry delay growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Retry delay between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.delay,
            BackoffKind::Exponential => self
                .delay
                .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1))),
        }
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: Backoff,
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff {
                kind: BackoffKind::Exponential,
                delay: Duration::from_secs(5),
            },
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

impl JobOptions {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, kind: BackoffKind, delay: Duration) -> Self {
        self.backoff = Backoff { kind, delay };
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: JobKind,
    pub options: JobOptions,
    pub attempts_made: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, options: JobOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            options,
            attempts_made: 0,
            created_at: Utc::now(),
        }
    }
}

/// A job that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: Job,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Accepts jobs for asynchronous processing.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, kind: JobKind, options: JobOptions) -> Result<Job, QueueError>;
}

/// Executes jobs taken from a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), CheckError>;
}

#[derive(Default)]
struct QueueState {
    pending: AtomicUsize,
    idle: Notify,
    completed: Mutex<Vec<Job>>,
    failed: Mutex<Vec<FailedJob>>,
}

impl QueueState {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-process queue backed by a single tokio worker task.
///
/// Jobs run one at a time in arrival order. A failed job is re-queued
/// after its backoff delay until its attempts are used up, then kept in
/// [`LocalJobQueue::failed_jobs`] unless `remove_on_fail` is set. Jobs
/// already queued keep running after the scheduler stops.
pub struct LocalJobQueue {
    tx: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
}

impl LocalJobQueue {
    /// Spawns the worker. Must be called inside a tokio runtime.
    pub fn start(handler: Arc<dyn JobHandler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(worker(rx, tx.clone(), handler, Arc::clone(&state)));
        Self { tx, state }
    }

    /// Jobs enqueued or waiting for a retry.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Completed jobs kept because `remove_on_complete` was off.
    pub async fn completed_jobs(&self) -> Vec<Job> {
        self.state.completed.lock().await.clone()
    }

    /// Jobs that exhausted their attempts.
    pub async fn failed_jobs(&self) -> Vec<FailedJob> {
        self.state.failed.lock().await.clone()
    }

    /// Waits until no job is queued, running or waiting for a retry.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, kind: JobKind, options: JobOptions) -> Result<Job, QueueError> {
        let job = Job::new(kind, options);
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(job.clone()).is_err() {
            self.state.finish();
            return Err(QueueError::Closed);
        }
        debug!(job = %job.id, "job enqueued");
        Ok(job)
    }
}

async fn worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    tx: mpsc::UnboundedSender<Job>,
    handler: Arc<dyn JobHandler>,
    state: Arc<QueueState>,
) {
    while let Some(mut job) = rx.recv().await {
        job.attempts_made += 1;
        match handler.handle(&job).await {
            Ok(()) => {
                debug!(job = %job.id, attempts = job.attempts_made, "job completed");
                if !job.options.remove_on_complete {
                    state.completed.lock().await.push(job);
                }
                state.finish();
            }
            Err(e) if job.attempts_made < job.options.attempts => {
                let delay = job.options.backoff.delay_for(job.attempts_made);
                warn!(
                    job = %job.id,
                    attempt = job.attempts_made,
                    delay_ms = delay.as_millis() as u64,
                    kind = e.kind(),
                    error = %e,
                    "job failed, retrying"
                );
                let tx = tx.clone();
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    sleep(delay).await;
                    if tx.send(job).is_err() {
                        state.finish();
                    }
                });
            }
            Err(e) => {
                error!(job = %job.id, attempts = job.attempts_made, kind = e.kind(), error = %e, "job failed");
                if !job.options.remove_on_fail {
                    state.failed.lock().await.push(FailedJob {
                        job,
                        error: e.to_string(),
                        failed_at: Utc::now(),
                    });
                }
                state.finish();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    use crate::error::DeliveryError;

    /// Fails the first `failures` calls.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for Flaky {
        async fn handle(&self, _job: &Job) -> Result<(), CheckError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(DeliveryError::Failed("boom".into()).into())
            } else {
                Ok(())
            }
        }
    }

    fn check(id: &str) -> JobKind {
        JobKind::CheckUnread {
            subscriber_ref: SubscriberId::new(id),
        }
    }

    #[test]
    fn test_job_wire_format() {
        let job = Job::new(check("42"), JobOptions::default());
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "check-unread");
        assert_eq!(value["payload"], json!({"subscriberRef": "42"}));
        assert_eq!(
            value["options"],
            json!({
                "attempts": 3,
                "backoff": {"type": "exponential", "delay": 5000},
                "removeOnComplete": true,
                "removeOnFail": false
            })
        );
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = JobOptions::default().backoff;
        assert_eq!(backoff.delay_for(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let handler = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let queue = LocalJobQueue::start(handler.clone());

        queue
            .enqueue(check("1"), JobOptions::default().with_attempts(3))
            .await
            .unwrap();
        queue.wait_idle().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(queue.failed_jobs().await.is_empty());
        assert!(queue.completed_jobs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_job_is_retained() {
        let handler = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let queue = LocalJobQueue::start(handler.clone());

        let job = queue.enqueue(check("7"), JobOptions::default()).await.unwrap();
        queue.wait_idle().await;

        let failed = queue.failed_jobs().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job.id, job.id);
        assert_eq!(failed[0].job.attempts_made, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_keeps_completed_when_asked() {
        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let queue = LocalJobQueue::start(handler);
        let options = JobOptions {
            remove_on_complete: false,
            ..JobOptions::default()
        };

        queue.enqueue(check("1"), options).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(queue.completed_jobs().await.len(), 1);
    }
}
