//! Rocket Notify Core - logic shared by the runtime and the bot.
//!
//! - **config**: environment configuration and state directory layout
//! - **vault**: authenticated encryption of backend tokens at rest
//! - **unread**: aggregation of raw subscription records into unread counts

pub mod config;
pub mod error;
pub mod unread;
pub mod vault;

pub use config::{AppConfig, PachcaConfig, SingleTenantCredentials};
pub use error::{ConfigError, VaultError};
pub use unread::{aggregate, coerce_count, unread_for_record};
pub use vault::CredentialVault;
