//! Delivery of private messages to participants.

use async_trait::async_trait;

use crate::santa::assignment::ParticipantId;

/// A message could not be delivered to one participant.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to deliver message to {participant}: {reason}")]
    Delivery { participant: ParticipantId, reason: String },
}

/// Sends text to a participant by id. Callers log failures; nothing retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, participant: ParticipantId, text: &str) -> Result<(), NotifyError>;
}
