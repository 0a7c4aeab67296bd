//! Secret Santa bot: registration, wish lists, and admin operations.
//!
//! Every handler returns the reply text for the caller's chat. Transport is
//! left to `main.rs`; messages to other participants go through the
//! [`Notifier`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

use crate::santa::aliases::{default_aliases, pick_unused_alias, unused_aliases};
use crate::santa::assignment::{ForbiddenPairs, ParticipantId};
use crate::santa::commands::{Command, help_text, parse_reassign_args};
use crate::santa::directory::{DirectoryError, Participant, ParticipantDirectory};
use crate::santa::draw::{DrawCoordinator, DrawError, DrawReport, recipient_notice};
use crate::santa::notifier::Notifier;
use crate::santa::pending::{PendingEdits, WishListEdit};

const NOT_REGISTERED: &str = "You need to register first using /start.";
const WISH_LIST_HINT: &str = "Use /wishlist <your wish list> to add one.";

/// Bot settings derived from the config file.
#[derive(Debug, Clone)]
pub struct SantaConfig {
    pub admin_id: ParticipantId,
    pub aliases: Vec<String>,
    pub forbidden: ForbiddenPairs,
    /// How long a `/wishlist` prompt waits for the participant's next message.
    pub pending_timeout: Duration,
}

impl Default for SantaConfig {
    fn default() -> Self {
        Self {
            admin_id: 0,
            aliases: default_aliases(),
            forbidden: ForbiddenPairs::new(),
            pending_timeout: Duration::from_secs(600),
        }
    }
}

/// The Secret Santa bot.
pub struct SantaBot {
    admin_id: ParticipantId,
    aliases: Vec<String>,
    directory: Arc<dyn ParticipantDirectory>,
    notifier: Arc<dyn Notifier>,
    draw: DrawCoordinator,
    pending: PendingEdits,
    rng: Mutex<ChaCha8Rng>,
    /// Serializes alias hand-out so two registrations never pick the same one.
    registration: tokio::sync::Mutex<()>,
}

impl SantaBot {
    pub fn new(
        config: SantaConfig,
        directory: Arc<dyn ParticipantDirectory>,
        notifier: Arc<dyn Notifier>,
        mut rng: ChaCha8Rng,
    ) -> Self {
        let draw_rng = ChaCha8Rng::seed_from_u64(rng.next_u64());
        let draw = DrawCoordinator::new(
            directory.clone(),
            notifier.clone(),
            config.admin_id,
            config.forbidden,
            draw_rng,
        );

        Self {
            admin_id: config.admin_id,
            aliases: config.aliases,
            directory,
            notifier,
            draw,
            pending: PendingEdits::new(config.pending_timeout),
            rng: Mutex::new(rng),
            registration: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_admin(&self, user_id: ParticipantId) -> bool {
        user_id == self.admin_id
    }

    /// Dispatch a parsed command and return the reply.
    pub async fn handle_command(
        &self,
        user_id: ParticipantId,
        username: Option<&str>,
        command: Command,
    ) -> String {
        match command {
            Command::Start => self.register(user_id, username).await,
            Command::Wishlist(text) => {
                self.edit_wish_list(user_id, &text, WishListEdit::Replace).await
            }
            Command::WishlistAdd(text) => {
                self.edit_wish_list(user_id, &text, WishListEdit::Append).await
            }
            Command::MyWishlist => self.my_wish_list(user_id).await,
            Command::ViewWishlist => self.view_recipient(user_id).await,
            Command::Cancel => self.cancel_edit(user_id).await,
            Command::Help => help_text(self.is_admin(user_id)),
            Command::InitiateDraw => self.initiate_draw(user_id).await,
            Command::ReassignAlias(args) => self.reassign_alias(user_id, &args).await,
            Command::RemindAll(text) => self.remind_all(user_id, &text).await,
            Command::Status => self.status(user_id).await,
        }
    }

    /// Handle a plain message. Returns a reply only if it completed a pending
    /// wish-list edit.
    pub async fn handle_text(&self, user_id: ParticipantId, text: &str) -> Option<String> {
        let mode = self.pending.take(user_id).await?;
        Some(self.edit_wish_list(user_id, text, mode).await)
    }

    /// Register the caller and hand out a random unused alias.
    pub async fn register(&self, user_id: ParticipantId, username: Option<&str>) -> String {
        reply_or_apologize(self.try_register(user_id, username).await, "registration")
    }

    async fn try_register(
        &self,
        user_id: ParticipantId,
        username: Option<&str>,
    ) -> Result<String, DirectoryError> {
        let _registration = self.registration.lock().await;

        if let Some(existing) = self.directory.get_participant(user_id).await? {
            return Ok(format!("You are already registered! Your code name is {}.", existing.alias));
        }

        let participants = self.directory.list_participants().await?;
        let alias = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            pick_unused_alias(&self.aliases, &participants, &mut *rng)
        };
        let Some(alias) = alias else {
            warn!("Registration by {} refused: alias pool exhausted", user_id);
            return Ok("No more code names available.".to_string());
        };

        let participant = Participant::new(user_id, username.map(str::to_string), alias.clone());
        self.directory.upsert_participant(&participant).await?;
        info!("🎅 Registered {} as {}", user_id, alias);

        Ok(format!("Registration successful! Your code name is {alias}."))
    }

    /// Replace or append to the caller's wish list. Empty text opens a
    /// pending edit filled by the caller's next message.
    pub async fn edit_wish_list(
        &self,
        user_id: ParticipantId,
        text: &str,
        mode: WishListEdit,
    ) -> String {
        reply_or_apologize(
            self.try_edit_wish_list(user_id, text, mode).await,
            "updating your wish list",
        )
    }

    async fn try_edit_wish_list(
        &self,
        user_id: ParticipantId,
        text: &str,
        mode: WishListEdit,
    ) -> Result<String, DirectoryError> {
        if self.directory.get_participant(user_id).await?.is_none() {
            return Ok(NOT_REGISTERED.to_string());
        }

        let text = text.trim();
        if text.is_empty() {
            self.pending.open(user_id, mode).await;
            return Ok(match mode {
                WishListEdit::Replace => "Please send your wish list as your next message.",
                WishListEdit::Append => "Please send the item to add as your next message.",
            }
            .to_string());
        }

        // An explicit edit supersedes any open prompt.
        self.pending.cancel(user_id).await;

        match mode {
            WishListEdit::Replace => {
                self.directory.set_wish_list(user_id, text).await?;
            }
            WishListEdit::Append => {
                self.directory.append_wish_list(user_id, text).await?;
            }
        }
        info!("📝 {} updated their wish list ({:?})", user_id, mode);

        self.notify_giver(user_id, "Your recipient has updated their wish list.").await;
        Ok("Your wish list has been updated.".to_string())
    }

    /// Drop wish-list prompts nobody answered in time.
    pub async fn purge_expired_edits(&self) -> usize {
        self.pending.purge_expired().await
    }

    async fn cancel_edit(&self, user_id: ParticipantId) -> String {
        if self.pending.cancel(user_id).await {
            "Wish list edit cancelled.".to_string()
        } else {
            "Nothing to cancel.".to_string()
        }
    }

    /// Show the caller's own alias and wish list.
    pub async fn my_wish_list(&self, user_id: ParticipantId) -> String {
        let result = self.directory.get_participant(user_id).await.map(|participant| {
            match participant {
                None => NOT_REGISTERED.to_string(),
                Some(p) if p.has_wish_list() => {
                    format!("Your code name: {}\nWish List: {}", p.alias, p.wish_list)
                }
                Some(p) => format!(
                    "Your code name: {}\nYou have no wish list yet. {}",
                    p.alias, WISH_LIST_HINT
                ),
            }
        });
        reply_or_apologize(result, "retrieving your wish list")
    }

    /// Show the alias and wish list of the caller's recipient.
    pub async fn view_recipient(&self, user_id: ParticipantId) -> String {
        reply_or_apologize(self.try_view_recipient(user_id).await, "retrieving the wish list")
    }

    async fn try_view_recipient(&self, user_id: ParticipantId) -> Result<String, DirectoryError> {
        let Some(assignment) = self.directory.get_assignment_for_giver(user_id).await? else {
            return Ok("You have not been assigned a recipient yet.".to_string());
        };

        let Some(recipient) = self.directory.get_participant(assignment.recipient_id).await? else {
            warn!(
                "Assignment {} -> {} points at a missing participant",
                user_id, assignment.recipient_id
            );
            return Ok("Recipient not found.".to_string());
        };

        let wish_list = if recipient.has_wish_list() {
            recipient.wish_list.as_str()
        } else {
            "No wish list yet."
        };
        Ok(format!("Recipient Code Name: {}\nWish List: {}", recipient.alias, wish_list))
    }

    /// Run the draw (admin only) and summarise the outcome.
    pub async fn initiate_draw(&self, user_id: ParticipantId) -> String {
        match self.draw.run_draw(user_id).await {
            Ok(report) => report.summary(),
            Err(e) => {
                if let DrawError::Directory(ref source) = e {
                    error!("Draw failed: {source}");
                }
                e.user_message()
            }
        }
    }

    /// Run the draw and return the structured outcome.
    pub async fn run_draw(&self, user_id: ParticipantId) -> Result<DrawReport, DrawError> {
        self.draw.run_draw(user_id).await
    }

    /// Give a participant a new alias (admin only).
    pub async fn reassign_alias(&self, user_id: ParticipantId, args: &str) -> String {
        if !self.is_admin(user_id) {
            warn!("Alias reassignment requested by non-admin {}", user_id);
            return "Only the admin can reassign aliases.".to_string();
        }
        let (target, requested) = match parse_reassign_args(args) {
            Ok(parsed) => parsed,
            Err(usage) => return usage,
        };
        reply_or_apologize(
            self.try_reassign_alias(target, requested).await,
            "alias reassignment",
        )
    }

    async fn try_reassign_alias(
        &self,
        target: ParticipantId,
        requested: Option<String>,
    ) -> Result<String, DirectoryError> {
        let _registration = self.registration.lock().await;

        let Some(participant) = self.directory.get_participant(target).await? else {
            return Ok(format!("Participant {target} is not registered."));
        };
        let participants = self.directory.list_participants().await?;

        let alias = match requested {
            Some(alias) => {
                if !self.aliases.contains(&alias) {
                    return Ok(format!("'{alias}' is not in the alias pool."));
                }
                if participants.iter().any(|p| p.alias == alias && p.id != target) {
                    return Ok(format!("'{alias}' is already taken."));
                }
                alias
            }
            None => {
                let picked = {
                    let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                    pick_unused_alias(&self.aliases, &participants, &mut *rng)
                };
                match picked {
                    Some(alias) => alias,
                    None => return Ok("No more code names available.".to_string()),
                }
            }
        };

        let previous = participant.alias;
        self.directory.set_alias(target, &alias).await?;
        info!("🔁 Participant {} renamed from {} to {}", target, previous, alias);

        let notice = format!("Your code name is now {alias}.");
        if let Err(e) = self.notifier.send(target, &notice).await {
            warn!("Could not tell {} about their new alias: {e}", target);
        }
        self.notify_giver(target, &format!("Your recipient's code name is now {alias}."))
            .await;

        Ok(format!("Participant {target} is now {alias} (was {previous})."))
    }

    /// Send every participant a reminder (admin only).
    pub async fn remind_all(&self, user_id: ParticipantId, text: &str) -> String {
        if !self.is_admin(user_id) {
            warn!("Bulk reminder requested by non-admin {}", user_id);
            return "Only the admin can send reminders.".to_string();
        }
        reply_or_apologize(self.try_remind_all(text.trim()).await, "sending reminders")
    }

    async fn try_remind_all(&self, text: &str) -> Result<String, DirectoryError> {
        let participants = self.directory.list_participants().await?;
        let recipients: HashMap<ParticipantId, ParticipantId> = self
            .directory
            .list_assignments()
            .await?
            .into_iter()
            .map(|a| (a.giver_id, a.recipient_id))
            .collect();
        let aliases: HashMap<ParticipantId, &str> =
            participants.iter().map(|p| (p.id, p.alias.as_str())).collect();

        let mut sent = 0;
        let mut failed = 0;
        for participant in &participants {
            let recipient_alias = recipients
                .get(&participant.id)
                .and_then(|recipient| aliases.get(recipient).copied());
            let Some(message) = reminder_text(participant, text, recipient_alias) else {
                continue;
            };
            match self.notifier.send(participant.id, &message).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("Reminder failed: {e}");
                    failed += 1;
                }
            }
        }

        info!("📣 Sent {} reminder(s), {} failed", sent, failed);
        Ok(format!("Sent {sent} reminder(s), {failed} failed."))
    }

    /// Registration and draw overview (admin only).
    pub async fn status(&self, user_id: ParticipantId) -> String {
        if !self.is_admin(user_id) {
            return "Only the admin can view the status.".to_string();
        }
        reply_or_apologize(self.try_status().await, "retrieving the status")
    }

    async fn try_status(&self) -> Result<String, DirectoryError> {
        let participants = self.directory.list_participants().await?;
        let assignments = self.directory.list_assignments().await?;
        let with_wish_list = participants.iter().filter(|p| p.has_wish_list()).count();
        let free_aliases = unused_aliases(&self.aliases, &participants).len();

        let draw = if assignments.is_empty() {
            "not run yet".to_string()
        } else {
            format!("{} assignment(s) stored", assignments.len())
        };

        Ok(format!(
            "Participants: {}\nWith wish lists: {}\nUnused code names: {}\nDraw: {}",
            participants.len(),
            with_wish_list,
            free_aliases,
            draw
        ))
    }

    /// Tell whoever drew `recipient` about a change. Failures are only logged.
    async fn notify_giver(&self, recipient: ParticipantId, text: &str) {
        match self.directory.get_assignment_for_recipient(recipient).await {
            Ok(Some(assignment)) => {
                if let Err(e) = self.notifier.send(assignment.giver_id, text).await {
                    warn!("Could not notify Secret Santa of {}: {e}", recipient);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not look up Secret Santa of {}: {e}", recipient),
        }
    }
}

/// Build one participant's reminder, or `None` if there is nothing to say.
fn reminder_text(
    participant: &Participant,
    extra: &str,
    recipient_alias: Option<&str>,
) -> Option<String> {
    let mut lines = Vec::new();
    if !extra.is_empty() {
        lines.push(extra.to_string());
    }
    if let Some(alias) = recipient_alias {
        lines.push(format!("Reminder: {}", recipient_notice(alias)));
    }
    if !participant.has_wish_list() {
        lines.push(format!("You haven't written a wish list yet. {WISH_LIST_HINT}"));
    }
    (!lines.is_empty()).then(|| lines.join("\n\n"))
}

fn reply_or_apologize(result: Result<String, DirectoryError>, action: &str) -> String {
    result.unwrap_or_else(|e| {
        error!("Failed during {action}: {e}");
        format!("An error occurred during {action}.")
    })
}
