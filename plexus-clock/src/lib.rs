//! Causal clocks for Plexus.
//!
//! - [`CausalClock`]: per-node sequence counters (a vector clock)
//! - [`CausalOrder`]: result of comparing two clocks
//!
//! [`CausalClock::compare`] is the partial causal order. [`CausalClock::total_compare`]
//! extends it with a deterministic tie-break for concurrent clocks; every
//! replica resolves concurrent writes the same way because of it, so the rule
//! must not change.

mod clock;
mod encoding;

pub use clock::{CausalClock, CausalOrder};

/// Errors raised while decoding an encoded clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("invalid node id {node:?}: {source}")]
    InvalidNodeId {
        node: String,
        #[source]
        source: plexus_types::Error,
    },
}
