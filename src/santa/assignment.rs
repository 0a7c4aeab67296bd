//! Constrained random assignment of givers to recipients.
//!
//! A draw is a bijection over the participant ids with no fixed points
//! (nobody gives to themselves) that also avoids every forbidden pair in
//! both directions. The search is plain randomized backtracking, which is
//! exponential in the worst case; groups are a few dozen people at most,
//! so that is fine.

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use rand::seq::SliceRandom;

/// Stable external participant identifier (the Telegram user id).
pub type ParticipantId = i64;

/// Giver → recipient mapping produced by a draw.
pub type Pairing = BTreeMap<ParticipantId, ParticipantId>;

/// Errors from the assignment engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentError {
    /// The search was exhausted without finding a valid bijection.
    #[error("no valid assignment exists for {participants} participant(s)")]
    NoValidAssignment { participants: usize },
    /// The same id appeared twice in the participant list.
    #[error("participant {0} is listed more than once")]
    DuplicateParticipant(ParticipantId),
}

/// Unordered pairs of participants that must never draw each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForbiddenPairs {
    pairs: HashSet<(ParticipantId, ParticipantId)>,
}

impl ForbiddenPairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid `a` and `b` from drawing each other. Returns false if the pair
    /// was already present in either order.
    pub fn insert(&mut self, a: ParticipantId, b: ParticipantId) -> bool {
        self.pairs.insert(unordered(a, b))
    }

    /// Symmetric lookup: `contains(a, b) == contains(b, a)`.
    pub fn contains(&self, a: ParticipantId, b: ParticipantId) -> bool {
        self.pairs.contains(&unordered(a, b))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

impl FromIterator<(ParticipantId, ParticipantId)> for ForbiddenPairs {
    fn from_iter<I: IntoIterator<Item = (ParticipantId, ParticipantId)>>(iter: I) -> Self {
        let mut forbidden = Self::new();
        for (a, b) in iter {
            forbidden.insert(a, b);
        }
        forbidden
    }
}

fn unordered(a: ParticipantId, b: ParticipantId) -> (ParticipantId, ParticipantId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Draw a giver → recipient mapping over `ids` that respects `forbidden`.
///
/// Every id appears exactly once as a giver and once as a recipient, nobody
/// draws themselves, and no forbidden pair is matched in either direction.
/// Pairs in `forbidden` that mention non-participants are ignored.
///
/// With an empty forbidden set this falls through to [`derange`]. Otherwise
/// it runs a randomized backtracking search whose worst case is exponential
/// in `ids.len()`.
pub fn assign<R: Rng + ?Sized>(
    ids: &[ParticipantId],
    forbidden: &ForbiddenPairs,
    rng: &mut R,
) -> Result<Pairing, AssignmentError> {
    ensure_unique(ids)?;
    if ids.is_empty() {
        return Ok(Pairing::new());
    }
    if forbidden.is_empty() {
        return derange(ids, rng);
    }
    search(ids, forbidden, rng)
}

/// Unconstrained draw: shuffle, then push any self-assignment one slot along.
///
/// Always terminates and succeeds for two or more participants. The result
/// is not uniformly distributed over all derangements.
pub fn derange<R: Rng + ?Sized>(
    ids: &[ParticipantId],
    rng: &mut R,
) -> Result<Pairing, AssignmentError> {
    ensure_unique(ids)?;
    match ids.len() {
        0 => return Ok(Pairing::new()),
        1 => return Err(AssignmentError::NoValidAssignment { participants: 1 }),
        _ => {}
    }

    let n = ids.len();
    let mut recipients = ids.to_vec();
    recipients.shuffle(rng);

    // Swapping a fixed point with its neighbour cannot create a new one
    // because ids are unique.
    for i in 0..n {
        if recipients[i] == ids[i] {
            recipients.swap(i, (i + 1) % n);
        }
    }

    Ok(ids.iter().copied().zip(recipients).collect())
}

/// Check that `pairing` is a valid draw over `ids` under `forbidden`.
pub fn is_valid_pairing(
    ids: &[ParticipantId],
    forbidden: &ForbiddenPairs,
    pairing: &Pairing,
) -> bool {
    if pairing.len() != ids.len() {
        return false;
    }
    let givers: HashSet<_> = ids.iter().copied().collect();
    let recipients: HashSet<_> = pairing.values().copied().collect();
    givers.len() == ids.len()
        && recipients == givers
        && pairing.iter().all(|(&giver, &recipient)| {
            givers.contains(&giver) && giver != recipient && !forbidden.contains(giver, recipient)
        })
}

fn ensure_unique(ids: &[ParticipantId]) -> Result<(), AssignmentError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for &id in ids {
        if !seen.insert(id) {
            return Err(AssignmentError::DuplicateParticipant(id));
        }
    }
    Ok(())
}

/// One level of the backtracking stack: a giver, its recipients in the order
/// they will be tried, and the recipient it currently holds.
struct Frame {
    giver: usize,
    options: Vec<usize>,
    cursor: usize,
    held: Option<usize>,
}

impl Frame {
    fn new<R: Rng + ?Sized>(giver: usize, candidates: &[Vec<usize>], rng: &mut R) -> Self {
        let mut options = candidates[giver].clone();
        options.shuffle(rng);
        Self { giver, options, cursor: 0, held: None }
    }

    fn next_free(&mut self, taken: &[bool]) -> Option<usize> {
        while let Some(&recipient) = self.options.get(self.cursor) {
            self.cursor += 1;
            if !taken[recipient] {
                return Some(recipient);
            }
        }
        None
    }
}

fn search<R: Rng + ?Sized>(
    ids: &[ParticipantId],
    forbidden: &ForbiddenPairs,
    rng: &mut R,
) -> Result<Pairing, AssignmentError> {
    let n = ids.len();

    // Indices into `ids`, so the search never touches the caller's slice.
    let candidates: Vec<Vec<usize>> = (0..n)
        .map(|giver| {
            (0..n)
                .filter(|&recipient| {
                    recipient != giver && !forbidden.contains(ids[giver], ids[recipient])
                })
                .collect()
        })
        .collect();

    if candidates.iter().any(Vec::is_empty) {
        return Err(AssignmentError::NoValidAssignment { participants: n });
    }

    // Random order, most constrained givers first.
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order.sort_by_key(|&giver| candidates[giver].len());

    let mut taken = vec![false; n];
    let mut stack: Vec<Frame> = Vec::with_capacity(n);
    stack.push(Frame::new(order[0], &candidates, rng));

    while let Some(frame) = stack.last_mut() {
        if let Some(previous) = frame.held.take() {
            taken[previous] = false;
        }

        match frame.next_free(&taken) {
            None => {
                stack.pop();
            }
            Some(recipient) => {
                taken[recipient] = true;
                frame.held = Some(recipient);

                let depth = stack.len();
                if depth == n {
                    return Ok(stack
                        .iter()
                        .filter_map(|f| f.held.map(|r| (ids[f.giver], ids[r])))
                        .collect());
                }
                stack.push(Frame::new(order[depth], &candidates, rng));
            }
        }
    }

    Err(AssignmentError::NoValidAssignment { participants: n })
}
