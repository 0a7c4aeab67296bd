//! Wish-list edits waiting for the participant's next free-text message.
//!
//! `/wishlist` with no text opens an edit; the next plain message from the
//! same participant closes it and becomes the wish list. Edits expire so a
//! forgotten prompt does not swallow an unrelated message days later.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::santa::assignment::ParticipantId;

/// How the pending text is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishListEdit {
    Replace,
    Append,
}

#[derive(Debug, Clone, Copy)]
struct PendingEdit {
    mode: WishListEdit,
    opened_at: Instant,
}

/// Keyed store of open wish-list edits, one per participant.
pub struct PendingEdits {
    timeout: Duration,
    edits: Mutex<HashMap<ParticipantId, PendingEdit>>,
}

impl PendingEdits {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            edits: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or restart) an edit for `participant`.
    pub async fn open(&self, participant: ParticipantId, mode: WishListEdit) {
        let mut edits = self.edits.lock().await;
        edits.insert(participant, PendingEdit { mode, opened_at: Instant::now() });
    }

    /// Close the participant's edit and return its mode if it has not expired.
    pub async fn take(&self, participant: ParticipantId) -> Option<WishListEdit> {
        let mut edits = self.edits.lock().await;
        let edit = edits.remove(&participant)?;
        (edit.opened_at.elapsed() <= self.timeout).then_some(edit.mode)
    }

    /// Drop the participant's edit. Returns true if one was open.
    pub async fn cancel(&self, participant: ParticipantId) -> bool {
        self.edits.lock().await.remove(&participant).is_some()
    }

    /// Remove expired edits.
    pub async fn purge_expired(&self) -> usize {
        let mut edits = self.edits.lock().await;
        let before = edits.len();
        edits.retain(|_, edit| edit.opened_at.elapsed() <= self.timeout);
        before - edits.len()
    }
}
