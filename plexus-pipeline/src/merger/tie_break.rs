//! Tie-break policies for [`FeedMerger`](super::FeedMerger).
//!
//! A policy sees the current queue head of every feed that may emit and picks
//! one. Replicas that must agree on a merged order need a policy that depends
//! only on the candidates, such as [`causal`].

use super::TieBreak;
use crate::feed::FeedBlock;
use plexus_clock::CausalOrder;
use plexus_model::Envelope;
use plexus_types::FeedKey;
use std::cmp::Ordering;

/// Always emits the candidate from the earliest tracked feed.
pub fn first<T: 'static>() -> TieBreak<T> {
    Box::new(|candidates: &[&FeedBlock<T>]| (!candidates.is_empty()).then_some(0))
}

/// Rotates through candidate positions.
pub fn round_robin<T: 'static>() -> TieBreak<T> {
    let mut turn: usize = 0;
    Box::new(move |candidates: &[&FeedBlock<T>]| {
        if candidates.is_empty() {
            return None;
        }
        let choice = turn % candidates.len();
        turn = turn.wrapping_add(1);
        Some(choice)
    })
}

/// Prefers feeds in the order given. Unlisted feeds come after listed ones,
/// in tracking order.
pub fn by_feed_priority<T: 'static>(priority: Vec<FeedKey>) -> TieBreak<T> {
    Box::new(move |candidates: &[&FeedBlock<T>]| {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, block)| {
                priority
                    .iter()
                    .position(|key| key == &block.feed_key)
                    .unwrap_or(usize::MAX)
            })
            .map(|(index, _)| index)
    })
}

/// Emits the causally earliest candidate.
///
/// Candidates are ordered by [`CausalClock::total_compare`] on their
/// timestamps; untimestamped envelopes go first. Ties keep tracking order.
///
/// [`CausalClock::total_compare`]: plexus_clock::CausalClock::total_compare
pub fn causal() -> TieBreak<Envelope> {
    Box::new(|candidates: &[&FeedBlock<Envelope>]| {
        candidates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| causal_cmp(a, b))
            .map(|(index, _)| index)
    })
}

fn causal_cmp(a: &FeedBlock<Envelope>, b: &FeedBlock<Envelope>) -> Ordering {
    match (&a.data.timestamp, &b.data.timestamp) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match x.total_compare(y) {
            CausalOrder::Before => Ordering::Less,
            CausalOrder::After => Ordering::Greater,
            CausalOrder::Equal | CausalOrder::Concurrent => Ordering::Equal,
        },
    }
}
