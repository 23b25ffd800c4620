//! Timer-driven polling scheduler.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use notify_models::Subscriber;
use notify_persistence::UserStore;

use crate::checker::UnreadChecker;
use crate::config::SchedulerConfig;
use crate::guard::{CycleGate, SchedulerState};
use crate::queue::{JobKind, JobQueue};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A previous cycle was still running.
    Skipped,
    /// Subscribers were checked in-process, in listing order.
    Inline {
        checked: usize,
        alerted: usize,
        failed: usize,
    },
    /// The batch was handed to the job queue.
    Queued { jobs: usize },
    /// The subscriber listing itself failed.
    Failed(String),
}

/// Runs polling cycles on a timer, at most one at a time.
pub struct PollingScheduler {
    config: SchedulerConfig,
    store: Arc<dyn UserStore>,
    checker: Arc<UnreadChecker>,
    queue: Arc<dyn JobQueue>,
    gate: CycleGate,
}

impl PollingScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn UserStore>,
        checker: Arc<UnreadChecker>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            store,
            checker,
            queue,
            gate: CycleGate::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.gate.state()
    }

    /// Runs one cycle unless one is already in flight.
    pub async fn tick(&self) -> CycleOutcome {
        let Some(_guard) = self.gate.try_enter() else {
            debug!("previous cycle still running, tick skipped");
            return CycleOutcome::Skipped;
        };

        let subscribers = match self.store.list_enabled().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                error!(error = %e, "failed to list subscribers");
                return CycleOutcome::Failed(e.to_string());
            }
        };

        let outcome = if subscribers.len() > self.config.queue_threshold {
            self.dispatch(subscribers).await
        } else {
            self.check_inline(subscribers).await
        };
        debug!(outcome = ?outcome, "cycle finished");
        outcome
    }

    async fn check_inline(&self, subscribers: Vec<Subscriber>) -> CycleOutcome {
        let mut checked = 0;
        let mut alerted = 0;
        let mut failed = 0;

        for subscriber in &subscribers {
            match self.checker.check(subscriber).await {
                Ok(outcome) => {
                    checked += 1;
                    if outcome.is_alert() {
                        alerted += 1;
                    }
                }
                Err(e) => {
                    failed += 1;
                    if e.needs_setup() {
                        error!(subscriber = %subscriber.id, kind = e.kind(), error = %e, "check failed, subscriber requires setup");
                    } else {
                        warn!(subscriber = %subscriber.id, kind = e.kind(), error = %e, "check failed");
                    }
                }
            }
        }

        CycleOutcome::Inline {
            checked,
            alerted,
            failed,
        }
    }

    async fn dispatch(&self, subscribers: Vec<Subscriber>) -> CycleOutcome {
        info!(count = subscribers.len(), threshold = self.config.queue_threshold, "dispatching batch to queue");
        let mut jobs = 0;
        for subscriber in subscribers {
            let kind = JobKind::CheckUnread {
                subscriber_ref: subscriber.id,
            };
            match self.queue.enqueue(kind, self.config.job_options).await {
                Ok(_) => jobs += 1,
                Err(e) => warn!(error = %e, "failed to enqueue check"),
            }
        }
        CycleOutcome::Queued { jobs }
    }

    /// Runs cycles until shutdown is signalled.
    ///
    /// The first cycle starts immediately. Each cycle runs in its own task
    /// so the timer keeps ticking; ticks that land on a running cycle are
    /// skipped by the in-flight guard. A cycle already started is not
    /// cancelled by shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            queue_threshold = self.config.queue_threshold,
            "polling started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        scheduler.tick().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("polling stopped");
    }
}
