//! Core data models for Rocket Notify.
//!
//! This crate provides the fundamental data types shared by every other
//! crate: subscribers and their persisted state, backend sessions, raw
//! subscription records and the derived unread snapshot.

pub mod ids;
pub mod record;
pub mod session;
pub mod setup;
pub mod subscriber;
pub mod unread;

// Re-export main types
pub use ids::{SubscriberId, CHANNEL_PREFIX};
pub use record::{SubscriptionKind, SubscriptionRecord};
pub use session::Session;
pub use setup::{SetupState, SetupStep};
pub use subscriber::{Destination, EncryptedSecret, Subscriber, DEFAULT_INTERVAL_MIN};
pub use unread::UnreadSnapshot;
