//! Alerts and the delivery contract.

use std::fmt::Write as _;

use async_trait::async_trait;

use notify_models::{Destination, UnreadSnapshot};

use crate::error::DeliveryError;

/// Which backend an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSource {
    RocketChat,
    Pachca,
}

impl AlertSource {
    fn title(self) -> &'static str {
        match self {
            Self::RocketChat => "Rocket.Chat",
            Self::Pachca => "Pachca",
        }
    }
}

/// Unread messages in one watched chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUnread {
    pub chat_id: String,
    pub unread: u64,
}

/// Optional detail rendered below the total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDetails {
    /// Per-type breakdown of a Rocket.Chat snapshot.
    Breakdown(UnreadSnapshot),
    /// Unread message counts per chat.
    PerChat(Vec<ChatUnread>),
    /// Chats that have unread messages; the total counts chats.
    UnreadChats(Vec<String>),
}

/// An unread-count alert ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub destination: Destination,
    pub source: AlertSource,
    pub total: u64,
    pub details: Option<AlertDetails>,
}

impl Alert {
    /// Alert for a Rocket.Chat snapshot, with breakdown.
    pub fn rocket_chat(destination: Destination, snapshot: UnreadSnapshot) -> Self {
        Self {
            destination,
            source: AlertSource::RocketChat,
            total: snapshot.total,
            details: Some(AlertDetails::Breakdown(snapshot)),
        }
    }

    /// Alert for Pachca unread messages across watched chats.
    pub fn pachca_messages(total: u64, chats: Vec<ChatUnread>) -> Self {
        Self {
            destination: Destination::Broadcast,
            source: AlertSource::Pachca,
            total,
            details: Some(AlertDetails::PerChat(chats)),
        }
    }

    /// Alert for Pachca chats flagged unread.
    pub fn pachca_chats(chat_ids: Vec<String>) -> Self {
        Self {
            destination: Destination::Broadcast,
            source: AlertSource::Pachca,
            total: chat_ids.len() as u64,
            details: Some(AlertDetails::UnreadChats(chat_ids)),
        }
    }

    /// Renders the fixed plain-text template.
    pub fn render(&self) -> String {
        let mut text = format!("🚨 {} notifications\n\n", self.source.title());

        match &self.details {
            Some(AlertDetails::UnreadChats(ids)) => {
                let _ = write!(text, "📩 Unread chats: {}", self.total);
                if !ids.is_empty() {
                    text.push('\n');
                }
                for id in ids {
                    let _ = write!(text, "\nChat {}", id);
                }
            }
            Some(AlertDetails::PerChat(chats)) => {
                let _ = write!(text, "📩 Unread: {}", self.total);
                let mut first = true;
                for chat in chats.iter().filter(|c| c.unread > 0) {
                    text.push_str(if first { "\n\n" } else { "\n" });
                    first = false;
                    let _ = write!(text, "Chat {}: {}", chat.chat_id, chat.unread);
                }
            }
            Some(AlertDetails::Breakdown(s)) => {
                let _ = write!(text, "📩 Unread: {}", self.total);
                let _ = write!(
                    text,
                    "\n\nChannels: {}\nDirect: {}\nGroups: {}",
                    s.channels, s.im, s.groups
                );
                if s.mentions > 0 {
                    let _ = write!(text, "\n🔔 Mentions: {}", s.mentions);
                }
            }
            None => {
                let _ = write!(text, "📩 Unread: {}", self.total);
            }
        }

        text
    }
}

/// Delivers alerts to the messaging platform.
///
/// Implementations must report failures instead of swallowing them: the
/// caller only advances the watermark after a successful send.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_breakdown() {
        let mut snapshot = UnreadSnapshot::from_buckets(1, 2, 0);
        snapshot.mentions = 1;
        let alert = Alert::rocket_chat(Destination::Chat(5), snapshot);

        assert_eq!(
            alert.render(),
            "🚨 Rocket.Chat notifications\n\n📩 Unread: 3\n\nChannels: 1\nDirect: 2\nGroups: 0\n🔔 Mentions: 1"
        );
    }

    #[test]
    fn test_render_without_mentions() {
        let alert = Alert::rocket_chat(Destination::Broadcast, UnreadSnapshot::from_buckets(3, 0, 0));
        assert!(!alert.render().contains("Mentions"));
    }

    #[test]
    fn test_render_per_chat_skips_read_chats() {
        let alert = Alert::pachca_messages(
            2,
            vec![
                ChatUnread { chat_id: "1".into(), unread: 2 },
                ChatUnread { chat_id: "2".into(), unread: 0 },
            ],
        );
        assert_eq!(alert.render(), "🚨 Pachca notifications\n\n📩 Unread: 2\n\nChat 1: 2");
    }

    #[test]
    fn test_render_unread_chats() {
        let alert = Alert::pachca_chats(vec!["10".into(), "11".into()]);
        assert_eq!(alert.total, 2);
        assert_eq!(
            alert.render(),
            "🚨 Pachca notifications\n\n📩 Unread chats: 2\n\nChat 10\nChat 11"
        );
    }
}
