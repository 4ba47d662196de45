//! Property-based tests for causal clock laws.
//!
//! - compare(c, c) == Equal
//! - compare(a, b) is the reverse of compare(b, a)
//! - total_compare never returns Concurrent and is antisymmetric
//! - from_object(to_object(c)) == c

use plexus_clock::{CausalClock, CausalOrder};
use plexus_types::NodeId;
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn node_strategy() -> impl Strategy<Value = NodeId> {
    prop::collection::vec(any::<u8>(), 0..4).prop_map(NodeId::from_bytes)
}

fn clock_strategy() -> impl Strategy<Value = CausalClock> {
    prop::collection::vec((node_strategy(), 0u64..8), 0..6).prop_map(|entries| {
        entries
            .into_iter()
            .fold(CausalClock::zero(), |clock, (node, seq)| clock.with_feed(node, seq))
    })
}

proptest! {
    #[test]
    fn compare_is_reflexive(c in clock_strategy()) {
        prop_assert_eq!(c.compare(&c), CausalOrder::Equal);
        prop_assert_eq!(c.total_compare(&c), CausalOrder::Equal);
    }

    #[test]
    fn compare_is_antisymmetric(a in clock_strategy(), b in clock_strategy()) {
        prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
    }

    #[test]
    fn total_compare_is_never_concurrent(a in clock_strategy(), b in clock_strategy()) {
        prop_assert_ne!(a.total_compare(&b), CausalOrder::Concurrent);
    }

    #[test]
    fn total_compare_is_antisymmetric(a in clock_strategy(), b in clock_strategy()) {
        prop_assert_eq!(a.total_compare(&b), b.total_compare(&a).reverse());
    }

    #[test]
    fn total_compare_agrees_with_causal_order(a in clock_strategy(), b in clock_strategy()) {
        let partial = a.compare(&b);
        if partial != CausalOrder::Concurrent {
            prop_assert_eq!(a.total_compare(&b), partial);
        }
    }

    #[test]
    fn object_roundtrip(c in clock_strategy()) {
        let decoded = CausalClock::from_object(&c.to_object()).unwrap();
        prop_assert_eq!(decoded.compare(&c), CausalOrder::Equal);
    }

    #[test]
    fn with_feed_never_lowers(c in clock_strategy(), node in node_strategy(), seq in 0u64..16) {
        let before = c.get(&node);
        let after = c.with_feed(node.clone(), seq).get(&node);
        prop_assert_eq!(after, before.max(seq));
        prop_assert!(c.with_feed(node, seq).dominates(&c));
    }

    #[test]
    fn merged_dominates_both(a in clock_strategy(), b in clock_strategy()) {
        let m = a.merged(&b);
        prop_assert!(m.dominates(&a));
        prop_assert!(m.dominates(&b));
    }
}
