//! Secret Santa Telegram bot.
//!
//! Participants register in a private chat, receive a code name, and keep a
//! wish list. The organizer runs a draw that pairs every participant with a
//! recipient while respecting forbidden pairs.

pub mod config;
pub mod santa;
pub mod telegram_log;
