//! Object encoding of causal clocks.
//!
//! A clock encodes to a map of hex node id to sequence. Zero entries are
//! omitted and decode back to 0 when absent.

use crate::{CausalClock, ClockError};
use plexus_types::NodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

impl CausalClock {
    /// Encodes the clock as a map of hex node id to sequence.
    #[must_use]
    pub fn to_object(&self) -> BTreeMap<String, u64> {
        self.nodes()
            .filter(|(_, seq)| *seq > 0)
            .map(|(node, seq)| (node.to_hex(), seq))
            .collect()
    }

    /// Decodes a clock from its object form.
    pub fn from_object(object: &BTreeMap<String, u64>) -> Result<Self, ClockError> {
        let mut clock = Self::zero();
        for (node, &seq) in object {
            let id = NodeId::from_hex(node).map_err(|source| ClockError::InvalidNodeId {
                node: node.clone(),
                source,
            })?;
            clock.observe(id, seq);
        }
        Ok(clock)
    }
}

impl Serialize for CausalClock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_object().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CausalClock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = BTreeMap::<String, u64>::deserialize(deserializer)?;
        Self::from_object(&object).map_err(serde::de::Error::custom)
    }
}
