//! Participant directory: the storage seam the bot and the draw depend on.

use async_trait::async_trait;

use crate::santa::assignment::{Pairing, ParticipantId};

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    /// Telegram username, kept for the admin's benefit only.
    pub username: Option<String>,
    /// Pseudonym shown to the participant's Secret Santa.
    pub alias: String,
    /// Free text, possibly empty.
    pub wish_list: String,
}

impl Participant {
    pub fn new(id: ParticipantId, username: Option<String>, alias: impl Into<String>) -> Self {
        Self {
            id,
            username,
            alias: alias.into(),
            wish_list: String::new(),
        }
    }

    pub fn has_wish_list(&self) -> bool {
        !self.wish_list.trim().is_empty()
    }
}

/// One giver → recipient record of the current draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Assignment {
    pub giver_id: ParticipantId,
    pub recipient_id: ParticipantId,
}

impl Assignment {
    /// Flatten a pairing into records ordered by giver.
    pub fn from_pairing(pairing: &Pairing) -> Vec<Self> {
        pairing
            .iter()
            .map(|(&giver_id, &recipient_id)| Self { giver_id, recipient_id })
            .collect()
    }
}

/// Participant or assignment state could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("participant directory unavailable: {0}")]
    Unavailable(String),
    /// An update targeted a participant that is not registered.
    #[error("participant {0} is not registered")]
    UnknownParticipant(ParticipantId),
}

/// Storage for participants and the current draw.
///
/// Implementations must make `replace_assignments` all-or-nothing: either the
/// whole new set is stored or the previous set is left untouched.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// All participants in registration order.
    async fn list_participants(&self) -> Result<Vec<Participant>, DirectoryError>;

    async fn get_participant(
        &self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, DirectoryError>;

    /// Insert a participant or overwrite the existing record with the same id.
    async fn upsert_participant(&self, participant: &Participant) -> Result<(), DirectoryError>;

    /// Append a line to a participant's wish list as a single atomic update.
    async fn append_wish_list(
        &self,
        id: ParticipantId,
        text: &str,
    ) -> Result<Participant, DirectoryError>;

    /// Overwrite only the wish list, leaving the rest of the record alone.
    async fn set_wish_list(&self, id: ParticipantId, text: &str) -> Result<(), DirectoryError>;

    /// Overwrite only the alias, leaving the rest of the record alone.
    async fn set_alias(&self, id: ParticipantId, alias: &str) -> Result<(), DirectoryError>;

    /// Replace the whole assignment set in one step.
    async fn replace_assignments(&self, assignments: &[Assignment]) -> Result<(), DirectoryError>;

    /// The current draw, ordered by giver.
    async fn list_assignments(&self) -> Result<Vec<Assignment>, DirectoryError>;

    async fn get_assignment_for_recipient(
        &self,
        recipient_id: ParticipantId,
    ) -> Result<Option<Assignment>, DirectoryError>;

    async fn get_assignment_for_giver(
        &self,
        giver_id: ParticipantId,
    ) -> Result<Option<Assignment>, DirectoryError>;
}
