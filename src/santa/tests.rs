//! Scenario tests for the Secret Santa bot, plus shared test doubles.
//!
//! Run with: cargo test santa

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::*;
use helpers::{RecordingNotifier, UnavailableDirectory};

pub(crate) mod helpers {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::{Mutex, Notify, Semaphore};

    use crate::santa::assignment::ParticipantId;
    use crate::santa::database::Database;
    use crate::santa::directory::{Assignment, DirectoryError, Participant, ParticipantDirectory};
    use crate::santa::notifier::{Notifier, NotifyError};

    /// Records every message; fails delivery for selected participants.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(ParticipantId, String)>>,
        failing: HashSet<ParticipantId>,
    }

    impl RecordingNotifier {
        pub fn failing_for(ids: &[ParticipantId]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: ids.iter().copied().collect(),
            }
        }

        /// Successfully delivered messages, in order.
        pub async fn sent(&self) -> Vec<(ParticipantId, String)> {
            self.sent.lock().await.clone()
        }

        pub async fn sent_to(&self, id: ParticipantId) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter(|(to, _)| *to == id)
                .map(|(_, text)| text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, participant: ParticipantId, text: &str) -> Result<(), NotifyError> {
            if self.failing.contains(&participant) {
                return Err(NotifyError::Delivery {
                    participant,
                    reason: "blocked by user".to_string(),
                });
            }
            self.sent.lock().await.push((participant, text.to_string()));
            Ok(())
        }
    }

    /// Blocks every send until `release` is called.
    pub struct GatedNotifier {
        entered: Notify,
        gate: Semaphore,
    }

    impl Default for GatedNotifier {
        fn default() -> Self {
            Self {
                entered: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    impl GatedNotifier {
        pub async fn wait_until_entered(&self) {
            self.entered.notified().await;
        }

        pub fn release(&self) {
            self.gate.add_permits(1024);
        }
    }

    #[async_trait]
    impl Notifier for GatedNotifier {
        async fn send(&self, participant: ParticipantId, _text: &str) -> Result<(), NotifyError> {
            self.entered.notify_one();
            self.gate
                .acquire()
                .await
                .map(|_| ())
                .map_err(|e| NotifyError::Delivery { participant, reason: e.to_string() })
        }
    }

    /// A directory whose backing store is down.
    pub struct UnavailableDirectory;

    fn offline() -> DirectoryError {
        DirectoryError::Unavailable("database is offline".to_string())
    }

    #[async_trait]
    impl ParticipantDirectory for UnavailableDirectory {
        async fn list_participants(&self) -> Result<Vec<Participant>, DirectoryError> {
            Err(offline())
        }
        async fn get_participant(
            &self,
            _id: ParticipantId,
        ) -> Result<Option<Participant>, DirectoryError> {
            Err(offline())
        }
        async fn upsert_participant(
            &self,
            _participant: &Participant,
        ) -> Result<(), DirectoryError> {
            Err(offline())
        }
        async fn append_wish_list(
            &self,
            _id: ParticipantId,
            _text: &str,
        ) -> Result<Participant, DirectoryError> {
            Err(offline())
        }
        async fn set_wish_list(
            &self,
            _id: ParticipantId,
            _text: &str,
        ) -> Result<(), DirectoryError> {
            Err(offline())
        }
        async fn set_alias(&self, _id: ParticipantId, _alias: &str) -> Result<(), DirectoryError> {
            Err(offline())
        }
        async fn replace_assignments(
            &self,
            _assignments: &[Assignment],
        ) -> Result<(), DirectoryError> {
            Err(offline())
        }
        async fn list_assignments(&self) -> Result<Vec<Assignment>, DirectoryError> {
            Err(offline())
        }
        async fn get_assignment_for_recipient(
            &self,
            _recipient_id: ParticipantId,
        ) -> Result<Option<Assignment>, DirectoryError> {
            Err(offline())
        }
        async fn get_assignment_for_giver(
            &self,
            _giver_id: ParticipantId,
        ) -> Result<Option<Assignment>, DirectoryError> {
            Err(offline())
        }
    }

    /// Wraps a database. Every call yields to the scheduler first so
    /// concurrent handlers interleave, and writes to the assignment table can
    /// be made to fail.
    pub struct FlakyDirectory {
        inner: Arc<Database>,
        reject_draws: bool,
    }

    impl FlakyDirectory {
        /// Yields before every call, otherwise behaves like `inner`.
        pub fn yielding(inner: Arc<Database>) -> Self {
            Self { inner, reject_draws: false }
        }

        /// Like `yielding`, but `replace_assignments` always fails.
        pub fn rejecting_draws(inner: Arc<Database>) -> Self {
            Self { inner, reject_draws: true }
        }
    }

    #[async_trait]
    impl ParticipantDirectory for FlakyDirectory {
        async fn list_participants(&self) -> Result<Vec<Participant>, DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.list_participants().await
        }
        async fn get_participant(
            &self,
            id: ParticipantId,
        ) -> Result<Option<Participant>, DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.get_participant(id).await
        }
        async fn upsert_participant(
            &self,
            participant: &Participant,
        ) -> Result<(), DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.upsert_participant(participant).await
        }
        async fn append_wish_list(
            &self,
            id: ParticipantId,
            text: &str,
        ) -> Result<Participant, DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.append_wish_list(id, text).await
        }
        async fn set_wish_list(&self, id: ParticipantId, text: &str) -> Result<(), DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.set_wish_list(id, text).await
        }
        async fn set_alias(&self, id: ParticipantId, alias: &str) -> Result<(), DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.set_alias(id, alias).await
        }
        async fn replace_assignments(
            &self,
            assignments: &[Assignment],
        ) -> Result<(), DirectoryError> {
            tokio::task::yield_now().await;
            if self.reject_draws {
                return Err(DirectoryError::Unavailable("disk I/O error".to_string()));
            }
            self.inner.replace_assignments(assignments).await
        }
        async fn list_assignments(&self) -> Result<Vec<Assignment>, DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.list_assignments().await
        }
        async fn get_assignment_for_recipient(
            &self,
            recipient_id: ParticipantId,
        ) -> Result<Option<Assignment>, DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.get_assignment_for_recipient(recipient_id).await
        }
        async fn get_assignment_for_giver(
            &self,
            giver_id: ParticipantId,
        ) -> Result<Option<Assignment>, DirectoryError> {
            tokio::task::yield_now().await;
            self.inner.get_assignment_for_giver(giver_id).await
        }
    }

    /// In-memory database with the given participants registered.
    pub async fn seeded_db(participants: &[(ParticipantId, &str)]) -> Arc<Database> {
        let db = Database::in_memory().unwrap();
        for &(id, alias) in participants {
            db.upsert_participant(&Participant::new(id, None, alias)).await.unwrap();
        }
        Arc::new(db)
    }
}

const ADMIN: ParticipantId = 1;

fn config() -> SantaConfig {
    SantaConfig {
        admin_id: ADMIN,
        ..SantaConfig::default()
    }
}

fn santa(db: Arc<Database>, notifier: Arc<RecordingNotifier>, config: SantaConfig) -> SantaBot {
    SantaBot::new(config, db, notifier, ChaCha8Rng::seed_from_u64(11))
}

async fn fresh() -> (SantaBot, Arc<Database>, Arc<RecordingNotifier>) {
    let db = Arc::new(Database::in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    (santa(db.clone(), notifier.clone(), config()), db, notifier)
}

// =============================================================================
// REGISTRATION
// =============================================================================

mod registration {
    use super::*;

    #[tokio::test]
    async fn test_register_assigns_pool_alias() {
        let (bot, db, _) = fresh().await;
        let reply = bot.register(100, Some("alice")).await;
        assert!(reply.starts_with("Registration successful! Your code name is "));

        let alice = db.get_participant(100).await.unwrap().unwrap();
        assert!(aliases::DEFAULT_ALIASES.contains(&alice.alias.as_str()));
        assert_eq!(alice.username.as_deref(), Some("alice"));
        assert!(reply.contains(&alice.alias));
    }

    #[tokio::test]
    async fn test_register_twice() {
        let (bot, db, _) = fresh().await;
        bot.register(100, None).await;
        let reply = bot.register(100, None).await;
        assert!(reply.starts_with("You are already registered!"));
        assert_eq!(db.list_participants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_aliases_are_unique_until_pool_runs_out() {
        let (bot, db, _) = fresh().await;
        for id in 0..6 {
            bot.register(100 + id, None).await;
        }

        let mut aliases: Vec<String> = db
            .list_participants()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.alias)
            .collect();
        aliases.sort();
        aliases.dedup();
        assert_eq!(aliases.len(), 6);

        assert_eq!(bot.register(200, None).await, "No more code names available.");
        assert!(db.get_participant(200).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_registrations_get_distinct_aliases() {
        let (bot, db, _) = fresh().await;
        let bot = Arc::new(bot);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bot = bot.clone();
                tokio::spawn(async move { bot.register(300 + i, None).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().starts_with("Registration successful!"));
        }

        let participants = db.list_participants().await.unwrap();
        let mut aliases: Vec<&str> = participants.iter().map(|p| p.alias.as_str()).collect();
        aliases.sort();
        aliases.dedup();
        assert_eq!(aliases.len(), 4);
    }

    #[tokio::test]
    async fn test_directory_error_is_reported_politely() {
        let bot = SantaBot::new(
            config(),
            Arc::new(UnavailableDirectory),
            Arc::new(RecordingNotifier::default()),
            ChaCha8Rng::seed_from_u64(1),
        );
        assert_eq!(bot.register(100, None).await, "An error occurred during registration.");
    }
}

// =============================================================================
// WISH LISTS
// =============================================================================

mod wish_lists {
    use super::*;
    use crate::santa::pending::WishListEdit;

    #[tokio::test]
    async fn test_requires_registration() {
        let (bot, _, _) = fresh().await;
        let reply = bot.edit_wish_list(100, "socks", WishListEdit::Replace).await;
        assert_eq!(reply, "You need to register first using /start.");
    }

    #[tokio::test]
    async fn test_replace_and_append() {
        let (bot, db, _) = fresh().await;
        bot.register(100, None).await;

        assert_eq!(
            bot.edit_wish_list(100, "socks", WishListEdit::Replace).await,
            "Your wish list has been updated."
        );
        bot.edit_wish_list(100, "  a book ", WishListEdit::Append).await;
        assert_eq!(db.get_participant(100).await.unwrap().unwrap().wish_list, "socks\na book");

        bot.edit_wish_list(100, "only tea", WishListEdit::Replace).await;
        assert_eq!(db.get_participant(100).await.unwrap().unwrap().wish_list, "only tea");
    }

    #[tokio::test]
    async fn test_pending_edit_consumes_next_message() {
        let (bot, db, _) = fresh().await;
        bot.register(100, None).await;

        let prompt = bot
            .handle_command(100, None, Command::Wishlist(String::new()))
            .await;
        assert_eq!(prompt, "Please send your wish list as your next message.");

        // Other participants' messages are not captured.
        assert_eq!(bot.handle_text(200, "hello").await, None);

        let reply = bot.handle_text(100, "a red scarf").await;
        assert_eq!(reply.as_deref(), Some("Your wish list has been updated."));
        assert_eq!(db.get_participant(100).await.unwrap().unwrap().wish_list, "a red scarf");

        // The edit is closed after one message.
        assert_eq!(bot.handle_text(100, "chatter").await, None);
    }

    #[tokio::test]
    async fn test_cancel_pending_edit() {
        let (bot, _, _) = fresh().await;
        bot.register(100, None).await;
        bot.handle_command(100, None, Command::WishlistAdd(" ".to_string())).await;

        assert_eq!(
            bot.handle_command(100, None, Command::Cancel).await,
            "Wish list edit cancelled."
        );
        assert_eq!(bot.handle_text(100, "ignored").await, None);
        assert_eq!(bot.handle_command(100, None, Command::Cancel).await, "Nothing to cancel.");
    }

    #[tokio::test]
    async fn test_unregistered_user_cannot_open_pending_edit() {
        let (bot, _, _) = fresh().await;
        bot.handle_command(100, None, Command::Wishlist(String::new())).await;
        assert_eq!(bot.handle_text(100, "socks").await, None);
    }

    #[tokio::test]
    async fn test_update_notifies_secret_santa() {
        let db = helpers::seeded_db(&[(100, "Mr. White"), (200, "Mr. Pink")]).await;
        db.replace_assignments(&[
            Assignment { giver_id: 100, recipient_id: 200 },
            Assignment { giver_id: 200, recipient_id: 100 },
        ])
        .await
        .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let bot = santa(db, notifier.clone(), config());

        bot.edit_wish_list(200, "board games", WishListEdit::Replace).await;
        assert_eq!(
            notifier.sent_to(100).await,
            vec!["Your recipient has updated their wish list.".to_string()]
        );
        assert!(notifier.sent_to(200).await.is_empty());
    }

    #[tokio::test]
    async fn test_my_wish_list() {
        let (bot, _, _) = fresh().await;
        assert_eq!(bot.my_wish_list(100).await, "You need to register first using /start.");

        bot.register(100, None).await;
        assert!(bot.my_wish_list(100).await.contains("You have no wish list yet"));

        bot.edit_wish_list(100, "mittens", WishListEdit::Replace).await;
        assert!(bot.my_wish_list(100).await.ends_with("Wish List: mittens"));
    }
}

// =============================================================================
// DRAW AND RECIPIENTS
// =============================================================================

mod draw_flow {
    use super::*;

    #[tokio::test]
    async fn test_view_before_draw() {
        let (bot, _, _) = fresh().await;
        bot.register(100, None).await;
        assert_eq!(bot.view_recipient(100).await, "You have not been assigned a recipient yet.");
    }

    #[tokio::test]
    async fn test_full_round() {
        let (bot, db, notifier) = fresh().await;
        for id in [ADMIN, 100, 200, 300] {
            bot.register(id, None).await;
        }
        bot.edit_wish_list(200, "coffee beans", pending::WishListEdit::Replace).await;

        let summary = bot.handle_command(ADMIN, None, Command::InitiateDraw).await;
        assert!(summary.starts_with("Secret Santa assignments have been made!"), "{summary}");

        let assignments = db.list_assignments().await.unwrap();
        assert_eq!(assignments.len(), 4);

        for a in &assignments {
            let recipient = db.get_participant(a.recipient_id).await.unwrap().unwrap();
            let view = bot.view_recipient(a.giver_id).await;
            assert!(view.starts_with(&format!("Recipient Code Name: {}", recipient.alias)));
            if a.recipient_id == 200 {
                assert!(view.ends_with("Wish List: coffee beans"));
            } else {
                assert!(view.ends_with("Wish List: No wish list yet."));
            }
            assert_eq!(notifier.sent_to(a.giver_id).await.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_non_admin_draw_is_declined() {
        let (bot, db, notifier) = fresh().await;
        for id in [ADMIN, 100, 200] {
            bot.register(id, None).await;
        }
        let reply = bot.handle_command(100, None, Command::InitiateDraw).await;
        assert_eq!(reply, "Only the admin can initiate the draw.");
        assert!(db.list_assignments().await.unwrap().is_empty());
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_configuration_reports_failure() {
        let db = helpers::seeded_db(&[(ADMIN, "Mr. White"), (100, "Mr. Pink")]).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let config = SantaConfig {
            forbidden: [(ADMIN, 100)].into_iter().collect(),
            ..config()
        };
        let bot = santa(db.clone(), notifier.clone(), config);

        let reply = bot.handle_command(ADMIN, None, Command::InitiateDraw).await;
        assert!(reply.starts_with("No valid Secret Santa assignment exists for 2 participant(s)"));
        assert!(db.list_assignments().await.unwrap().is_empty());
        assert!(notifier.sent().await.is_empty());
    }
}

// =============================================================================
// ADMIN OPERATIONS
// =============================================================================

mod admin {
    use super::*;

    #[tokio::test]
    async fn test_reassign_requires_admin() {
        let db = helpers::seeded_db(&[(100, "Mr. White")]).await;
        let bot = santa(db.clone(), Arc::new(RecordingNotifier::default()), config());
        let reply = bot.reassign_alias(100, "100 Mr. Blue").await;
        assert_eq!(reply, "Only the admin can reassign aliases.");
        assert_eq!(db.get_participant(100).await.unwrap().unwrap().alias, "Mr. White");
    }

    #[tokio::test]
    async fn test_reassign_to_requested_alias() {
        let db = helpers::seeded_db(&[(100, "Mr. White"), (200, "Mr. Pink")]).await;
        db.replace_assignments(&[
            Assignment { giver_id: 100, recipient_id: 200 },
            Assignment { giver_id: 200, recipient_id: 100 },
        ])
        .await
        .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let bot = santa(db.clone(), notifier.clone(), config());

        let reply = bot.reassign_alias(ADMIN, "200 Mr. Blue").await;
        assert_eq!(reply, "Participant 200 is now Mr. Blue (was Mr. Pink).");
        assert_eq!(db.get_participant(200).await.unwrap().unwrap().alias, "Mr. Blue");
        assert_eq!(
            notifier.sent_to(200).await,
            vec!["Your code name is now Mr. Blue.".to_string()]
        );
        assert_eq!(
            notifier.sent_to(100).await,
            vec!["Your recipient's code name is now Mr. Blue.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reassign_rejects_taken_and_unknown_aliases() {
        let db = helpers::seeded_db(&[(100, "Mr. White"), (200, "Mr. Pink")]).await;
        let bot = santa(db, Arc::new(RecordingNotifier::default()), config());

        assert_eq!(
            bot.reassign_alias(ADMIN, "200 Mr. White").await,
            "'Mr. White' is already taken."
        );
        assert_eq!(
            bot.reassign_alias(ADMIN, "200 Rudolph").await,
            "'Rudolph' is not in the alias pool."
        );
        assert_eq!(bot.reassign_alias(ADMIN, "999").await, "Participant 999 is not registered.");
        assert_eq!(bot.reassign_alias(ADMIN, "").await, "Usage: /reassign_alias <user_id> [alias]");
    }

    #[tokio::test]
    async fn test_alias_change_and_wish_list_edit_both_stick() {
        let db = helpers::seeded_db(&[(100, "Mr. White"), (200, "Mr. Pink")]).await;
        let directory = Arc::new(helpers::FlakyDirectory::yielding(db.clone()));
        let bot = Arc::new(SantaBot::new(
            config(),
            directory,
            Arc::new(RecordingNotifier::default()),
            ChaCha8Rng::seed_from_u64(11),
        ));

        let edit = {
            let bot = bot.clone();
            tokio::spawn(async move {
                bot.edit_wish_list(200, "socks", pending::WishListEdit::Replace).await
            })
        };
        let rename = {
            let bot = bot.clone();
            tokio::spawn(async move { bot.reassign_alias(ADMIN, "200 Mr. Blue").await })
        };

        assert_eq!(edit.await.unwrap(), "Your wish list has been updated.");
        assert_eq!(rename.await.unwrap(), "Participant 200 is now Mr. Blue (was Mr. Pink).");

        let stored = db.get_participant(200).await.unwrap().unwrap();
        assert_eq!(stored.alias, "Mr. Blue");
        assert_eq!(stored.wish_list, "socks");
    }

    #[tokio::test]
    async fn test_reassign_random_alias() {
        let db = helpers::seeded_db(&[(100, "Mr. White")]).await;
        let bot = santa(db.clone(), Arc::new(RecordingNotifier::default()), config());

        bot.reassign_alias(ADMIN, "100").await;
        let alias = db.get_participant(100).await.unwrap().unwrap().alias;
        assert_ne!(alias, "Mr. White");
        assert!(aliases::DEFAULT_ALIASES.contains(&alias.as_str()));
    }

    #[tokio::test]
    async fn test_remind_all() {
        let db =
            helpers::seeded_db(&[(100, "Mr. White"), (200, "Mr. Pink"), (300, "Mr. Blue")]).await;
        let mut with_list = Participant::new(300, None, "Mr. Blue");
        with_list.wish_list = "candles".to_string();
        db.upsert_participant(&with_list).await.unwrap();
        db.replace_assignments(&[
            Assignment { giver_id: 100, recipient_id: 200 },
            Assignment { giver_id: 200, recipient_id: 300 },
            Assignment { giver_id: 300, recipient_id: 100 },
        ])
        .await
        .unwrap();

        let notifier = Arc::new(RecordingNotifier::failing_for(&[200]));
        let bot = santa(db, notifier.clone(), config());

        let command = Command::RemindAll("Gift exchange on Friday!".to_string());
        let reply = bot.handle_command(ADMIN, None, command).await;
        assert_eq!(reply, "Sent 2 reminder(s), 1 failed.");

        let to_100 = notifier.sent_to(100).await;
        assert_eq!(to_100.len(), 1);
        assert!(to_100[0].starts_with("Gift exchange on Friday!"));
        assert!(to_100[0].contains("You are the Secret Santa for Mr. Pink."));
        assert!(to_100[0].contains("You haven't written a wish list yet."));

        let to_300 = notifier.sent_to(300).await;
        assert!(to_300[0].contains("Mr. White"));
        assert!(!to_300[0].contains("You haven't written a wish list yet."));
    }

    #[tokio::test]
    async fn test_remind_all_skips_participants_with_nothing_to_hear() {
        let db = helpers::seeded_db(&[(100, "Mr. White")]).await;
        let mut done = Participant::new(100, None, "Mr. White");
        done.wish_list = "nothing, really".to_string();
        db.upsert_participant(&done).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let bot = santa(db, notifier.clone(), config());
        assert_eq!(bot.remind_all(ADMIN, "").await, "Sent 0 reminder(s), 0 failed.");
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_cannot_remind_or_view_status() {
        let (bot, _, notifier) = fresh().await;
        assert_eq!(bot.remind_all(100, "hi").await, "Only the admin can send reminders.");
        assert_eq!(bot.status(100).await, "Only the admin can view the status.");
        assert!(notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_status() {
        let (bot, _, _) = fresh().await;
        bot.register(100, None).await;
        bot.register(200, None).await;
        bot.edit_wish_list(200, "yarn", pending::WishListEdit::Replace).await;

        let status = bot.status(ADMIN).await;
        assert_eq!(
            status,
            "Participants: 2\nWith wish lists: 1\nUnused code names: 4\nDraw: not run yet"
        );
    }

    #[tokio::test]
    async fn test_help_depends_on_caller() {
        let (bot, _, _) = fresh().await;
        assert!(bot.handle_command(ADMIN, None, Command::Help).await.contains("/initiate_draw"));
        assert!(!bot.handle_command(100, None, Command::Help).await.contains("/initiate_draw"));
    }
}
