//! In-flight guard for polling cycles.

use std::sync::atomic::{AtomicBool, Ordering};

/// Scheduler state as seen by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Allows at most one cycle to run at a time.
///
/// A second caller does not wait; [`CycleGate::try_enter`] simply returns
/// `None` while a cycle is in flight.
#[derive(Debug, Default)]
pub struct CycleGate {
    running: AtomicBool,
}

impl CycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `Idle -> Running`, or returns `None` if already running.
    /// The gate returns to `Idle` when the guard is dropped.
    pub fn try_enter(&self) -> Option<CycleGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { gate: self })
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }
}

/// Holds the gate in `Running` until dropped.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    gate: &'a CycleGate,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}
