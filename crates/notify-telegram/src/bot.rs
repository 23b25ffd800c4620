//! Telegram bot dispatcher.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{info, warn};

use crate::error::{Result, TelegramError};
use crate::handlers::{handle_callback, handle_command, handle_message, Command};
use crate::state::BotState;

/// The Telegram bot for Rocket Notify.
pub struct NotifyBot {
    bot: Bot,
    state: Arc<BotState>,
}

impl NotifyBot {
    pub fn new(bot: Bot, state: Arc<BotState>) -> Self {
        Self { bot, state }
    }

    /// Get the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::BotStartFailed(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Runs long polling until Ctrl+C.
    pub async fn start_polling(&self) -> Result<()> {
        info!("starting telegram bot in polling mode");

        let bot = self.bot.clone();
        let state_for_commands = Arc::clone(&self.state);
        let state_for_messages = Arc::clone(&self.state);
        let state_for_callbacks = Arc::clone(&self.state);

        let handler = dptree::entry()
            .branch(
                Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
                    let state = Arc::clone(&state_for_callbacks);
                    async move { handle_callback(bot, q, state).await }
                }),
            )
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
                        let state = Arc::clone(&state_for_commands);
                        info!(chat_id = %msg.chat.id, command = cmd_name(&cmd), "command received");
                        async move { handle_command(bot, msg, cmd, state).await }
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some_and(|t| t.starts_with('/')))
                    .endpoint(|bot: Bot, msg: Message| async move {
                        if let Some(text) = msg.text() {
                            let name = text.split_whitespace().next().unwrap_or(text);
                            bot.send_message(
                                msg.chat.id,
                                format!("Unknown command: {}\n\nUse /help to see available commands.", name),
                            )
                            .await?;
                        }
                        Ok(())
                    }),
            )
            .branch(
                Update::filter_message()
                    .filter(|msg: Message| msg.text().is_some_and(|t| !t.starts_with('/')))
                    .endpoint(move |bot: Bot, msg: Message| {
                        let state = Arc::clone(&state_for_messages);
                        async move { handle_message(bot, msg, state).await }
                    }),
            );

        Dispatcher::builder(bot, handler)
            .default_handler(|upd| async move {
                warn!(update_id = upd.id.0, "unhandled update");
            })
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("telegram bot stopped");
        Ok(())
    }
}

/// Command name for logs. `/login` arguments contain a password and are
/// never logged.
fn cmd_name(cmd: &Command) -> &'static str {
    match cmd {
        Command::Start => "start",
        Command::Help => "help",
        Command::Setup => "setup",
        Command::Login(_) => "login",
        Command::Cancel => "cancel",
        Command::Stop => "stop",
        Command::Status => "status",
    }
}
