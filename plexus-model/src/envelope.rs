//! Feed message envelopes.
//!
//! Every message appended to a feed is an [`Envelope`]: an optional causal
//! timestamp plus a [`Payload`] drawn from a closed set of kinds. Control
//! kinds change which feeds are admitted to the merge; entity kinds are routed
//! to the entity they name.

use crate::{ModelKind, ModelResult};
use plexus_clock::CausalClock;
use plexus_types::{EntityId, FeedKey, FeedPosition, Seq};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The payload of a feed message.
///
/// Decoding an unknown `kind` fails; there is no catch-all variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Admit a feed to the merge.
    Admit { feed_key: FeedKey },

    /// Remove a feed from the merge.
    Remove { feed_key: FeedKey },

    /// Create an entity.
    Genesis {
        entity_id: EntityId,
        /// Application-defined entity type (e.g. "task").
        entity_type: String,
        /// Model that replays the entity's mutations.
        model_kind: ModelKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<EntityId>,
        /// Optional first mutation, replayed before any later one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mutation: Option<serde_json::Value>,
    },

    /// Mutate an entity. The mutation schema belongs to the entity's model.
    Mutation {
        entity_id: EntityId,
        mutation: serde_json::Value,
    },

    /// Application-defined message not addressed to any entity.
    Custom {
        tag: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl Payload {
    /// Returns the entity this payload addresses, for entity kinds.
    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Self::Genesis { entity_id, .. } | Self::Mutation { entity_id, .. } => Some(*entity_id),
            Self::Admit { .. } | Self::Remove { .. } | Self::Custom { .. } => None,
        }
    }

    /// Returns true for admission control payloads.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Admit { .. } | Self::Remove { .. })
    }

    /// Short name of the payload kind, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admit { .. } => "admit",
            Self::Remove { .. } => "remove",
            Self::Genesis { .. } => "genesis",
            Self::Mutation { .. } => "mutation",
            Self::Custom { .. } => "custom",
        }
    }
}

/// A feed message: payload plus optional causal timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Clock of the state the writer had observed when writing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<CausalClock>,

    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope without a timestamp.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            timestamp: None,
            payload,
        }
    }

    /// Creates an admit control message.
    #[must_use]
    pub fn admit(feed_key: FeedKey) -> Self {
        Self::new(Payload::Admit { feed_key })
    }

    /// Creates a remove control message.
    #[must_use]
    pub fn remove(feed_key: FeedKey) -> Self {
        Self::new(Payload::Remove { feed_key })
    }

    /// Creates a genesis message without parent or initial mutation.
    #[must_use]
    pub fn genesis(
        entity_id: EntityId,
        entity_type: impl Into<String>,
        model_kind: impl Into<ModelKind>,
    ) -> Self {
        Self::new(Payload::Genesis {
            entity_id,
            entity_type: entity_type.into(),
            model_kind: model_kind.into(),
            parent_id: None,
            mutation: None,
        })
    }

    /// Creates a mutation message.
    #[must_use]
    pub fn mutation(entity_id: EntityId, mutation: serde_json::Value) -> Self {
        Self::new(Payload::Mutation { entity_id, mutation })
    }

    /// Creates a custom message.
    #[must_use]
    pub fn custom(tag: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(Payload::Custom {
            tag: tag.into(),
            data,
        })
    }

    /// Attaches a causal timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: CausalClock) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Encodes the envelope as JSON bytes.
    pub fn encode(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope from JSON bytes. Unknown payload kinds are errors.
    pub fn decode(bytes: &[u8]) -> ModelResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Where a message came from in the merged stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub feed_key: FeedKey,
    pub seq: Seq,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<CausalClock>,
}

impl MessageMeta {
    /// Returns the feed position of the message.
    #[must_use]
    pub fn position(&self) -> FeedPosition {
        FeedPosition::new(self.feed_key.clone(), self.seq)
    }
}

/// An entity mutation as delivered to its model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub meta: MessageMeta,
    pub mutation: serde_json::Value,
}

impl ModelMessage {
    /// Decodes the mutation into the model's mutation type.
    pub fn decode<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(T::deserialize(&self.mutation)?)
    }
}
