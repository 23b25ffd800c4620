//! Rocket Notify Backend - HTTP clients for the chat backends.
//!
//! - [`RocketChatClient`]: login and `subscriptions.get` for Rocket.Chat
//! - [`PachcaClient`]: messages, readers and unread ids for Pachca
//! - [`RetryPolicy`]: bounded exponential backoff shared by both

pub mod backend;
pub mod error;
pub mod pachca;
pub mod retry;
pub mod rocket_chat;

pub use backend::ChatBackend;
pub use error::{BackendError, Result};
pub use pachca::{PachcaApi, PachcaClient, PachcaMessage, PachcaReader, DEFAULT_MESSAGE_LIMIT};
pub use retry::RetryPolicy;
pub use rocket_chat::RocketChatClient;
