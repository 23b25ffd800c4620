//! Scheduler configuration.

use std::time::Duration;

use crate::queue::JobOptions;

/// Configuration for the polling scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between polling cycles.
    pub poll_interval: Duration,
    /// Above this many enabled subscribers a cycle is handed to the queue.
    pub queue_threshold: usize,
    /// Options for queued check jobs.
    pub job_options: JobOptions,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            queue_threshold: 20,
            job_options: JobOptions::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the queue threshold.
    pub fn with_queue_threshold(mut self, threshold: usize) -> Self {
        self.queue_threshold = threshold;
        self
    }

    /// Sets the options used for queued jobs.
    pub fn with_job_options(mut self, options: JobOptions) -> Self {
        self.job_options = options;
        self
    }
}
