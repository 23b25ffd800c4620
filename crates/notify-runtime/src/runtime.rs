//! Runtime manager: owns the background polling tasks.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, RuntimeError};
use crate::pachca_watcher::PachcaWatcher;
use crate::scheduler::PollingScheduler;

/// Starts and stops the Rocket.Chat scheduler and the optional Pachca
/// watcher.
pub struct NotifyRuntime {
    scheduler: Arc<PollingScheduler>,
    pachca: Option<Arc<PachcaWatcher>>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    started: bool,
}

impl NotifyRuntime {
    pub fn new(scheduler: Arc<PollingScheduler>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            scheduler,
            pachca: None,
            handles: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            started: false,
        }
    }

    /// Also run a Pachca watcher.
    pub fn with_pachca(mut self, watcher: Arc<PachcaWatcher>) -> Self {
        self.pachca = Some(watcher);
        self
    }

    /// Start polling.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }

        info!("starting runtime");

        let scheduler = Arc::clone(&self.scheduler);
        let shutdown_rx = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(scheduler.run(shutdown_rx)));

        if let Some(watcher) = &self.pachca {
            let watcher = Arc::clone(watcher);
            let shutdown_rx = self.shutdown_rx.clone();
            self.handles.push(tokio::spawn(watcher.run(shutdown_rx)));
        }

        self.started = true;
        debug!("runtime started");
        Ok(())
    }

    /// Stop the timers and wait for the loops to exit. Cycles and queued
    /// jobs already running finish on their own.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.started {
            return Err(RuntimeError::NotStarted);
        }

        info!("shutting down runtime");

        self.shutdown_tx.send(true).map_err(|e| {
            RuntimeError::Shutdown(format!("failed to send shutdown signal: {}", e))
        })?;

        for handle in self.handles.drain(..) {
            handle
                .await
                .map_err(|e| RuntimeError::Shutdown(format!("polling task panicked: {}", e)))?;
        }

        self.started = false;
        info!("runtime stopped");
        Ok(())
    }

    pub fn scheduler(&self) -> Arc<PollingScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Drop for NotifyRuntime {
    fn drop(&mut self) {
        if self.started {
            let _ = self.shutdown_tx.send(true);
        }
    }
}
