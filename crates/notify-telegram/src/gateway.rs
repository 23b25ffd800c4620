//! Alert delivery through the Telegram Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use teloxide::utils::html;
use tracing::{debug, warn};

use notify_models::Destination;
use notify_runtime::{Alert, DeliveryError, NotificationGateway};

/// Parses a configured channel reference: a numeric chat id or a public
/// `@username`. A bare username gets its `@` added.
pub fn parse_recipient(raw: &str) -> Option<Recipient> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(id) = raw.parse::<i64>() {
        return Some(Recipient::Id(ChatId(id)));
    }
    let name = raw.trim_start_matches('@');
    if name.is_empty() {
        return None;
    }
    Some(Recipient::ChannelUsername(format!("@{}", name)))
}

/// Sends alerts as HTML messages.
pub struct TelegramGateway {
    bot: Bot,
    broadcast: Option<Recipient>,
}

impl TelegramGateway {
    pub fn new(bot: Bot, channel: Option<&str>) -> Self {
        let broadcast = channel.and_then(parse_recipient);
        if channel.is_some() && broadcast.is_none() {
            warn!(channel = ?channel, "ignoring unusable broadcast channel");
        }
        Self { bot, broadcast }
    }

    /// Resolves where an alert should go.
    pub fn recipient_for(&self, destination: &Destination) -> Result<Recipient, DeliveryError> {
        match destination {
            Destination::Chat(id) => Ok(Recipient::Id(ChatId(*id))),
            Destination::Broadcast => self
                .broadcast
                .clone()
                .ok_or_else(|| DeliveryError::NoDestination("broadcast alert".to_string())),
        }
    }
}

/// HTML body for an alert. Rendered text is escaped as a whole.
pub fn format_alert(alert: &Alert) -> String {
    html::escape(&alert.render())
}

#[async_trait]
impl NotificationGateway for TelegramGateway {
    async fn send_alert(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let recipient = self.recipient_for(&alert.destination)?;
        debug!(recipient = ?recipient, total = alert.total, "sending alert");

        self.bot
            .send_message(recipient, format_alert(alert))
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_models::UnreadSnapshot;

    fn gateway(channel: Option<&str>) -> TelegramGateway {
        TelegramGateway::new(Bot::new("123:test"), channel)
    }

    #[test]
    fn test_parse_recipient() {
        assert_eq!(
            parse_recipient("-1001234"),
            Some(Recipient::Id(ChatId(-1001234)))
        );
        assert_eq!(
            parse_recipient("@alerts"),
            Some(Recipient::ChannelUsername("@alerts".to_string()))
        );
        assert_eq!(
            parse_recipient(" alerts "),
            Some(Recipient::ChannelUsername("@alerts".to_string()))
        );
        assert_eq!(parse_recipient(""), None);
        assert_eq!(parse_recipient("@"), None);
    }

    #[test]
    fn test_chat_destination() {
        let gw = gateway(None);
        assert_eq!(
            gw.recipient_for(&Destination::Chat(42)).unwrap(),
            Recipient::Id(ChatId(42))
        );
    }

    #[test]
    fn test_broadcast_without_channel() {
        let gw = gateway(None);
        assert!(matches!(
            gw.recipient_for(&Destination::Broadcast),
            Err(DeliveryError::NoDestination(_))
        ));
    }

    #[test]
    fn test_broadcast_with_channel() {
        let gw = gateway(Some("@team_alerts"));
        assert_eq!(
            gw.recipient_for(&Destination::Broadcast).unwrap(),
            Recipient::ChannelUsername("@team_alerts".to_string())
        );
    }

    #[test]
    fn test_format_alert_escapes_html() {
        let alert = Alert::pachca_chats(vec!["<b>ops</b>".to_string()]);
        let body = format_alert(&alert);
        assert!(body.contains("&lt;b&gt;ops&lt;/b&gt;"));

        let alert = Alert::rocket_chat(Destination::Chat(1), UnreadSnapshot::from_buckets(1, 2, 0));
        assert!(format_alert(&alert).contains("Unread: 3"));
    }
}
