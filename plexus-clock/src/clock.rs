//! Vector clock for causality tracking.
//!
//! A causal clock records, per node, the highest sequence counter observed
//! from that node. Comparing two clocks tells whether one observed state
//! causally precedes the other or whether they are concurrent.
//!
//! Use cases:
//! - Stamping outbound mutations with the state they were written against
//! - Ordering merged feed messages
//! - Waiting until a written message has been observed again

use plexus_types::{FeedPosition, NodeId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Causality relationship between two clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CausalOrder {
    /// First clock happened before second.
    Before,
    /// First clock happened after second.
    After,
    /// Clocks are concurrent (neither happened before the other).
    Concurrent,
    /// Clocks are identical.
    Equal,
}

impl CausalOrder {
    /// Returns the order seen from the other side of the comparison.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
            other => other,
        }
    }
}

/// A vector clock keyed by node id.
///
/// Absent nodes read as 0 and zero entries are never stored, so two clocks
/// with the same non-zero entries are structurally identical.
#[derive(Debug, Clone, Default)]
pub struct CausalClock {
    /// Map from node ID to the highest sequence observed from it.
    entries: BTreeMap<NodeId, u64>,
}

impl CausalClock {
    /// The identity clock: nothing observed.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns a new clock equal to this one except that `node` is raised
    /// to `max(current, seq)`.
    #[must_use]
    pub fn with_feed(&self, node: impl Into<NodeId>, seq: u64) -> Self {
        let mut clock = self.clone();
        clock.observe(node, seq);
        clock
    }

    /// Raises the entry for `node` to `seq`. Lower values are ignored.
    pub fn observe(&mut self, node: impl Into<NodeId>, seq: u64) {
        if seq == 0 {
            return;
        }
        let entry = self.entries.entry(node.into()).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    /// Returns the sequence for a node (0 if not present).
    #[must_use]
    pub fn get(&self, node: &NodeId) -> u64 {
        self.entries.get(node).copied().unwrap_or(0)
    }

    /// Returns all nodes and their sequences, ordered by raw node bytes.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.entries.iter().map(|(node, &seq)| (node, seq))
    }

    /// Returns the number of nodes in the clock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the clock has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges another clock into this one, taking the maximum per node.
    pub fn merge(&mut self, other: &Self) {
        for (node, &seq) in &other.entries {
            let entry = self.entries.entry(node.clone()).or_insert(0);
            if seq > *entry {
                *entry = seq;
            }
        }
    }

    /// Creates a new clock that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Compares this clock with another to determine causal ordering.
    #[must_use]
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let mut dominated_by_self = true; // self >= other for all nodes
        let mut dominated_by_other = true; // other >= self for all nodes

        for node in self.entries.keys().chain(other.entries.keys()) {
            let self_seq = self.get(node);
            let other_seq = other.get(node);

            if self_seq < other_seq {
                dominated_by_self = false;
            }
            if other_seq < self_seq {
                dominated_by_other = false;
            }
        }

        match (dominated_by_self, dominated_by_other) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    /// Like [`compare`](Self::compare), but concurrent clocks are ordered
    /// deterministically and `Concurrent` is never returned.
    ///
    /// Entries of both clocks are walked in ascending numeric order of their
    /// node ids. At the first position where they differ:
    /// - the clock whose node id is numerically smaller is `After`;
    /// - on the same node id, the clock with the smaller sequence is `After`.
    ///
    /// Node ids compare as unsigned big-endian integers of any length.
    #[must_use]
    pub fn total_compare(&self, other: &Self) -> CausalOrder {
        let order = self.compare(other);
        if order != CausalOrder::Concurrent {
            return order;
        }

        let ours = self.entries_by_value();
        let theirs = other.entries_by_value();
        for ((our_node, our_seq), (their_node, their_seq)) in ours.iter().zip(&theirs) {
            match cmp_node_value(our_node, their_node) {
                Ordering::Less => return CausalOrder::After,
                Ordering::Greater => return CausalOrder::Before,
                Ordering::Equal => {}
            }
            match our_seq.cmp(their_seq) {
                Ordering::Less => return CausalOrder::After,
                Ordering::Greater => return CausalOrder::Before,
                Ordering::Equal => {}
            }
        }

        // Only reachable when distinct byte strings share a numeric value,
        // e.g. `0005` and `05`.
        let ours = ours.iter().map(|(node, seq)| (node.as_bytes(), *seq));
        let theirs = theirs.iter().map(|(node, seq)| (node.as_bytes(), *seq));
        match ours.cmp(theirs) {
            Ordering::Greater => CausalOrder::Before,
            _ => CausalOrder::After,
        }
    }

    /// Returns true if this clock is causally before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Returns true if this clock is causally after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::After
    }

    /// Returns true if this clock is concurrent with the other.
    #[must_use]
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Returns true if this clock dominates the other (is >= for all nodes).
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(self.compare(other), CausalOrder::After | CausalOrder::Equal)
    }

    /// Returns true once the message at `position` has been observed.
    ///
    /// Entries count messages, so observing seq `n` of a feed raises that
    /// feed's entry to `n + 1`, saturating at `u64::MAX`.
    #[must_use]
    pub fn has_observed(&self, position: &FeedPosition) -> bool {
        self.get(&NodeId::from(&position.feed_key)) >= position.seq.saturating_add(1)
    }

    fn entries_by_value(&self) -> Vec<(&NodeId, u64)> {
        let mut entries: Vec<_> = self.nodes().collect();
        entries.sort_by(|(a, _), (b, _)| {
            cmp_node_value(a, b).then_with(|| a.as_bytes().cmp(b.as_bytes()))
        });
        entries
    }
}

/// Compares two node ids as unsigned big-endian integers.
fn cmp_node_value(a: &NodeId, b: &NodeId) -> Ordering {
    let a = significant(a.as_bytes());
    let b = significant(b.as_bytes());
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn significant(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl From<&FeedPosition> for CausalClock {
    fn from(position: &FeedPosition) -> Self {
        Self::zero().with_feed(&position.feed_key, position.seq.saturating_add(1))
    }
}

impl PartialEq for CausalClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for CausalClock {}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(bytes: &[u8]) -> NodeId {
        NodeId::from_bytes(bytes.to_vec())
    }

    #[test]
    fn node_value_ignores_leading_zeros() {
        assert_eq!(cmp_node_value(&node(&[0, 0, 5]), &node(&[5])), Ordering::Equal);
        assert_eq!(cmp_node_value(&node(&[1, 0]), &node(&[2])), Ordering::Greater);
        assert_eq!(cmp_node_value(&node(&[0xff]), &node(&[1, 0])), Ordering::Less);
    }

    #[test]
    fn zero_sequence_is_not_stored() {
        let clock = CausalClock::zero().with_feed(node(&[1]), 0);
        assert!(clock.is_empty());
    }

    #[test]
    fn numerically_equal_ids_still_order() {
        let a = CausalClock::zero().with_feed(node(&[0, 5]), 1);
        let b = CausalClock::zero().with_feed(node(&[5]), 1);
        assert_eq!(a.compare(&b), CausalOrder::Concurrent);
        assert_eq!(a.total_compare(&b), CausalOrder::After);
        assert_eq!(b.total_compare(&a), CausalOrder::Before);
    }
}
