//! Persistence layer for Rocket Notify.
//!
//! Subscribers are stored one JSON file per record using atomic writes
//! (write to temp file, then rename), behind the [`UserStore`] trait so the
//! runtime does not depend on the storage technology.
//!
//! # Example
//!
//! ```no_run
//! use notify_persistence::{FileUserStore, UserStore};
//!
//! # async fn demo() -> notify_persistence::Result<()> {
//! let store = FileUserStore::new("/home/user/.rocket-notify");
//! let subscriber = store.find_or_create(&"12345".into()).await?;
//! store.update_watermark(&subscriber.id, 3).await?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod error;
pub mod file_store;
pub mod user_store;

pub use error::{PersistenceError, Result};
pub use file_store::FileUserStore;
pub use user_store::{CredentialPatch, UserStore};
