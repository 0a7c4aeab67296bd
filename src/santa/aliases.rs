//! Alias pool handed out at registration.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::santa::directory::Participant;

/// Pool used when the config file does not provide one.
pub const DEFAULT_ALIASES: [&str; 6] = [
    "Mr. White",
    "Mr. Orange",
    "Mr. Blonde",
    "Mr. Pink",
    "Mr. Brown",
    "Mr. Blue",
];

pub fn default_aliases() -> Vec<String> {
    DEFAULT_ALIASES.iter().map(|s| s.to_string()).collect()
}

/// Pool entries not held by any participant, in pool order.
pub fn unused_aliases<'a>(pool: &'a [String], participants: &[Participant]) -> Vec<&'a str> {
    let used: HashSet<&str> = participants.iter().map(|p| p.alias.as_str()).collect();
    pool.iter()
        .map(String::as_str)
        .filter(|alias| !used.contains(alias))
        .collect()
}

/// Uniform random pick among unused aliases, `None` when the pool is exhausted.
pub fn pick_unused_alias<R: Rng + ?Sized>(
    pool: &[String],
    participants: &[Participant],
    rng: &mut R,
) -> Option<String> {
    unused_aliases(pool, participants)
        .choose(rng)
        .map(|alias| alias.to_string())
}
