//! Secret Santa module - registration, wish lists and the constrained draw.

pub mod aliases;
pub mod assignment;
pub mod bot;
pub mod commands;
pub mod database;
pub mod directory;
pub mod draw;
pub mod notifier;
pub mod pending;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentError, ForbiddenPairs, Pairing, ParticipantId, assign, derange};
pub use bot::{SantaBot, SantaConfig};
pub use commands::Command;
pub use database::Database;
pub use directory::{Assignment, DirectoryError, Participant, ParticipantDirectory};
pub use draw::{DrawCoordinator, DrawError, DrawReport};
pub use notifier::{Notifier, NotifyError};
pub use telegram::TelegramNotifier;
