//! Telegram front end for Rocket Notify.
//!
//! Delivers unread alerts through the Bot API and lets chats register,
//! connect a Rocket.Chat account and pause alerts.
//!
//! # Environment Variables
//!
//! Required:
//! - `TELEGRAM_BOT_TOKEN`: Bot token from @BotFather
//! - `RC_TOKEN_SALT`: Secret the credential encryption key is derived from
//!
//! Optional:
//! - `TELEGRAM_CHANNEL_ID`: Broadcast channel (numeric id or `@username`)
//! - `RC_SERVER`, `RC_USER`, `RC_PASSWORD`: Single-tenant account
//! - `RC_RETAIN_PASSWORD`: Keep encrypted wizard passwords for re-login
//! - `POLLING_INTERVAL_MIN`, `POLLING_QUEUE_THRESHOLD`
//! - `PACHCA_*`: Pachca watcher settings
//!
//! # Commands
//!
//! - `/start` - Register this chat
//! - `/setup` - Connect an account step by step
//! - `/login <server> <user> <password>` - Connect in one message
//! - `/cancel` - Abort a running setup
//! - `/stop` - Pause alerts
//! - `/status` - Show connection status
//! - `/help` - Show available commands

pub mod app;
pub mod bootstrap;
pub mod bot;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod state;
pub mod wizard;

pub use app::App;
pub use bootstrap::bootstrap_single_tenant;
pub use bot::NotifyBot;
pub use error::{Result, TelegramError};
pub use gateway::{format_alert, parse_recipient, TelegramGateway};
pub use handlers::Command;
pub use state::{create_shared_state, BotState, WizardReply};
pub use wizard::{normalize_server, WizardStep};
