//! Rocket Notify Runtime - the unread detection and delivery loop.
//!
//! - [`PollingScheduler`]: ticks on an interval, one cycle in flight at a
//!   time; large batches go to a [`JobQueue`]
//! - [`UnreadChecker`]: fetch, aggregate, compare, notify, persist for one
//!   subscriber
//! - [`SessionManager`]: login, cached sessions and re-authentication on 401
//! - [`PachcaWatcher`]: the same loop for a process-wide Pachca account
//! - [`NotifyRuntime`]: starts and stops the background loops
//!
//! Alert delivery is abstracted behind [`NotificationGateway`].

pub mod alert;
pub mod checker;
pub mod config;
pub mod error;
pub mod guard;
pub mod pachca_watcher;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod session;

pub use alert::{Alert, AlertDetails, AlertSource, ChatUnread, NotificationGateway};
pub use checker::{CheckOutcome, SkipReason, UnreadChecker};
pub use config::SchedulerConfig;
pub use error::{CheckError, DeliveryError, QueueError, Result, RuntimeError, SessionError};
pub use guard::{CycleGate, CycleGuard, SchedulerState};
pub use pachca_watcher::{PachcaWatcher, PachcaWatcherConfig, WatchOutcome};
pub use queue::{Backoff, BackoffKind, FailedJob, Job, JobHandler, JobKind, JobOptions, JobQueue, LocalJobQueue};
pub use runtime::NotifyRuntime;
pub use scheduler::{CycleOutcome, PollingScheduler};
pub use session::{Credential, SessionManager};
