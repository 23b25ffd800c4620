//! Command handlers for the Telegram bot.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use notify_models::SetupStep;

use crate::error::TelegramError;
use crate::state::{parse_login_args, status_text, BotState, WizardReply};
use crate::wizard::{CANCEL_CALLBACK, PROMPT_SERVER};

/// Bot commands that can be invoked with /.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Register this chat for unread alerts")]
    Start,

    #[command(description = "Show help message")]
    Help,

    #[command(description = "Connect a Rocket.Chat account step by step")]
    Setup,

    #[command(description = "Connect in one go: /login <server> <user> <password>")]
    Login(String),

    #[command(description = "Cancel a running setup")]
    Cancel,

    #[command(description = "Pause alerts for this chat")]
    Stop,

    #[command(description = "Show connection status")]
    Status,
}

fn cancel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Cancel",
        CANCEL_CALLBACK,
    )]])
}

/// Removes a message that carried a password. Failure is only logged: in
/// groups the bot may lack the right to delete.
async fn delete_secret_message(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, message_id).await {
        warn!(chat_id = %chat_id, error = %e, "could not delete message with password");
    }
}

async fn reply_error(bot: &Bot, chat_id: ChatId, err: &TelegramError) -> ResponseResult<()> {
    error!(chat_id = %chat_id, error = %err, "request failed");
    bot.send_message(chat_id, format!("❌ {}", err.user_message())).await?;
    Ok(())
}

fn connected_text(server: Option<&str>) -> String {
    format!(
        "✅ Connected to {}. You will get a message when new unread messages arrive.",
        server.unwrap_or("the server")
    )
}

/// Handle bot commands.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let id = BotState::subscriber_id(chat_id);

    match cmd {
        Command::Start => match state.start(&id).await {
            Ok(sub) => {
                let next = if sub.is_configured() {
                    "Alerts are on."
                } else {
                    "Run /setup to connect your Rocket.Chat account."
                };
                bot.send_message(chat_id, format!("👋 Rocket Notify is watching this chat.\n\n{}", next))
                    .await?;
            }
            Err(e) => reply_error(&bot, chat_id, &e).await?,
        },

        Command::Help => {
            bot.send_message(chat_id, Command::descriptions().to_string()).await?;
        }

        Command::Setup => match state.begin_setup(&id).await {
            Ok(()) => {
                bot.send_message(chat_id, PROMPT_SERVER)
                    .reply_markup(cancel_keyboard())
                    .await?;
            }
            Err(e) => reply_error(&bot, chat_id, &e).await?,
        },

        Command::Login(args) => {
            delete_secret_message(&bot, chat_id, msg.id).await;

            let Some((server, user, password)) = parse_login_args(&args) else {
                bot.send_message(chat_id, "Usage: /login <server> <user> <password>").await?;
                return Ok(());
            };

            match state.login(&id, server, user, password).await {
                Ok(sub) => {
                    info!(subscriber = %id, "connected via /login");
                    bot.send_message(chat_id, connected_text(sub.rc_server.as_deref())).await?;
                }
                Err(e) => reply_error(&bot, chat_id, &e).await?,
            }
        }

        Command::Cancel => match state.cancel_setup(&id).await {
            Ok(true) => {
                bot.send_message(chat_id, "Setup cancelled.").await?;
            }
            Ok(false) => {
                bot.send_message(chat_id, "No setup is running.").await?;
            }
            Err(e) => reply_error(&bot, chat_id, &e).await?,
        },

        Command::Stop => match state.stop(&id).await {
            Ok(true) => {
                bot.send_message(chat_id, "🔕 Alerts paused. Send /start to resume.").await?;
            }
            Ok(false) => {
                bot.send_message(chat_id, "This chat is not registered.").await?;
            }
            Err(e) => reply_error(&bot, chat_id, &e).await?,
        },

        Command::Status => match state.subscriber(&id).await {
            Ok(sub) => {
                bot.send_message(chat_id, status_text(sub.as_ref())).await?;
            }
            Err(e) => reply_error(&bot, chat_id, &e).await?,
        },
    }

    Ok(())
}

/// Handle plain text messages: wizard input.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let id = BotState::subscriber_id(chat_id);

    let at_password_step = state
        .subscriber(&id)
        .await
        .ok()
        .flatten()
        .and_then(|sub| sub.setup)
        .is_some_and(|setup| setup.step == SetupStep::Pass);

    let reply = state.wizard_input(&id, text).await;
    if at_password_step {
        delete_secret_message(&bot, chat_id, msg.id).await;
    }

    match reply {
        Ok(WizardReply::Inactive) => {
            debug!(chat_id = %chat_id, "ignoring text outside of setup");
            bot.send_message(chat_id, "Send /setup to connect an account or /help for commands.")
                .await?;
        }
        Ok(WizardReply::Prompt(prompt)) => {
            bot.send_message(chat_id, prompt)
                .reply_markup(cancel_keyboard())
                .await?;
        }
        Ok(WizardReply::Rejected(reason)) => {
            bot.send_message(chat_id, format!("⚠️ {}", reason))
                .reply_markup(cancel_keyboard())
                .await?;
        }
        Ok(WizardReply::Connected(sub)) => {
            info!(subscriber = %id, "connected via setup");
            bot.send_message(chat_id, connected_text(sub.rc_server.as_deref())).await?;
        }
        Ok(WizardReply::Restart) => {
            bot.send_message(chat_id, "Setup was reset. Send /setup to start again.").await?;
        }
        Err(e) => reply_error(&bot, chat_id, &e).await?,
    }

    Ok(())
}

/// Handle inline button presses.
pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };

    match q.data.as_deref() {
        Some(CANCEL_CALLBACK) => {
            let id = BotState::subscriber_id(chat_id);
            match state.cancel_setup(&id).await {
                Ok(_) => {
                    bot.send_message(chat_id, "Setup cancelled.").await?;
                }
                Err(e) => reply_error(&bot, chat_id, &e).await?,
            }
        }
        other => {
            debug!(data = ?other, "unknown callback");
        }
    }

    Ok(())
}
