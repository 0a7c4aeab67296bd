//! Draw orchestration: read participants, assign, persist, notify.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::santa::assignment::{self, AssignmentError, ForbiddenPairs, ParticipantId};
use crate::santa::directory::{Assignment, DirectoryError, ParticipantDirectory};
use crate::santa::notifier::Notifier;

/// Why a draw did not complete.
#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("user {0} is not allowed to run the draw")]
    Unauthorized(ParticipantId),
    #[error("a draw is already in progress")]
    InProgress,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
}

const UNCHANGED: &str = "Previous assignments are unchanged.";

impl DrawError {
    /// Reply text for the admin who asked for the draw.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized(_) => "Only the admin can initiate the draw.".to_string(),
            Self::InProgress => "A draw is already running. Try again in a moment.".to_string(),
            Self::Directory(_) => format!(
                "The draw failed: participant records could not be accessed. {UNCHANGED}"
            ),
            Self::Assignment(AssignmentError::NoValidAssignment { participants }) => format!(
                "No valid Secret Santa assignment exists for {participants} participant(s) \
                 with the current restrictions. {UNCHANGED}"
            ),
            Self::Assignment(AssignmentError::DuplicateParticipant(id)) => {
                format!("Participant {id} is registered twice; the draw was aborted.")
            }
        }
    }
}

/// Outcome of a successful draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawReport {
    pub pairs: usize,
    pub notified: usize,
    /// Givers whose notification could not be delivered.
    pub failed_notifications: Vec<ParticipantId>,
}

impl DrawReport {
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Secret Santa assignments have been made! {} pair(s), {} giver(s) notified.",
            self.pairs, self.notified
        );
        if !self.failed_notifications.is_empty() {
            let ids: Vec<String> =
                self.failed_notifications.iter().map(|id| id.to_string()).collect();
            text.push_str(&format!("\nCould not reach: {}", ids.join(", ")));
        }
        text
    }
}

/// Message a giver receives after the draw.
pub fn recipient_notice(alias: &str) -> String {
    format!("You are the Secret Santa for {alias}. Use /view_wishlist to see their wish list.")
}

/// Runs draws against a directory and notifier.
pub struct DrawCoordinator {
    directory: Arc<dyn ParticipantDirectory>,
    notifier: Arc<dyn Notifier>,
    admin_id: ParticipantId,
    forbidden: ForbiddenPairs,
    rng: Mutex<ChaCha8Rng>,
    in_flight: tokio::sync::Mutex<()>,
}

impl DrawCoordinator {
    pub fn new(
        directory: Arc<dyn ParticipantDirectory>,
        notifier: Arc<dyn Notifier>,
        admin_id: ParticipantId,
        forbidden: ForbiddenPairs,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            directory,
            notifier,
            admin_id,
            forbidden,
            rng: Mutex::new(rng),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_admin(&self, caller: ParticipantId) -> bool {
        caller == self.admin_id
    }

    /// Run a draw on behalf of `caller`.
    ///
    /// Stored assignments are only replaced once the engine has produced a
    /// complete, valid pairing. Notification failures are logged and reported
    /// but do not fail the draw.
    pub async fn run_draw(&self, caller: ParticipantId) -> Result<DrawReport, DrawError> {
        if !self.is_admin(caller) {
            warn!("Draw requested by non-admin {}", caller);
            return Err(DrawError::Unauthorized(caller));
        }

        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Draw requested while another is running");
            return Err(DrawError::InProgress);
        };

        let participants = self.directory.list_participants().await?;
        let ids: Vec<ParticipantId> = participants.iter().map(|p| p.id).collect();
        info!(
            "🎲 Drawing for {} participant(s), {} forbidden pair(s)",
            ids.len(),
            self.forbidden.len()
        );

        let drawn = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            assignment::assign(&ids, &self.forbidden, &mut *rng)
        };
        let pairing = match drawn {
            Ok(pairing) => pairing,
            Err(e) => {
                warn!("Draw failed: {e}");
                return Err(e.into());
            }
        };
        debug_assert!(assignment::is_valid_pairing(&ids, &self.forbidden, &pairing));

        let assignments = Assignment::from_pairing(&pairing);
        self.directory.replace_assignments(&assignments).await?;

        let aliases: HashMap<ParticipantId, &str> =
            participants.iter().map(|p| (p.id, p.alias.as_str())).collect();
        let report = self.notify_givers(&assignments, &aliases).await;

        info!(
            "✅ Draw complete: {} pair(s), {} notified, {} failed",
            report.pairs,
            report.notified,
            report.failed_notifications.len()
        );
        Ok(report)
    }

    /// Tell each giver who they drew. A giver whose recipient has no known
    /// alias counts as a failed notification.
    async fn notify_givers(
        &self,
        assignments: &[Assignment],
        aliases: &HashMap<ParticipantId, &str>,
    ) -> DrawReport {
        let mut report = DrawReport {
            pairs: assignments.len(),
            notified: 0,
            failed_notifications: Vec::new(),
        };

        for assignment in assignments {
            let Some(alias) = aliases.get(&assignment.recipient_id) else {
                warn!(
                    "No alias for recipient {}, giver {} was not notified",
                    assignment.recipient_id, assignment.giver_id
                );
                report.failed_notifications.push(assignment.giver_id);
                continue;
            };
            match self.notifier.send(assignment.giver_id, &recipient_notice(alias)).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    warn!("Draw notification failed: {e}");
                    report.failed_notifications.push(assignment.giver_id);
                }
            }
        }
        report
    }
}
