//! Telegram notifier using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::santa::assignment::ParticipantId;
use crate::santa::notifier::{Notifier, NotifyError};

/// Sends private messages through the Bot API.
///
/// A participant's private chat id equals their user id, so participant ids
/// can be used as chat ids directly. The participant must have started a
/// conversation with the bot for delivery to succeed.
pub struct TelegramNotifier {
    bot: Bot,
    dry_run: bool,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot, dry_run: false }
    }

    /// Log messages instead of sending them.
    pub fn dry_run(bot: Bot) -> Self {
        Self { bot, dry_run: true }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, participant: ParticipantId, text: &str) -> Result<(), NotifyError> {
        if self.dry_run {
            info!("[DRY RUN] Would send to {}: {:?}", participant, text);
            return Ok(());
        }

        self.bot
            .send_message(ChatId(participant), text)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to send to {}: {e}", participant);
                NotifyError::Delivery {
                    participant,
                    reason: e.to_string(),
                }
            })
    }
}
