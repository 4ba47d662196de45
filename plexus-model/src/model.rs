//! The replay model contract.

use crate::{ModelError, ModelMessage, ModelResult};
use async_trait::async_trait;
use plexus_types::{EntityId, FeedPosition};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Name of a model implementation (e.g. `plexus:model/object`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelKind(String);

impl ModelKind {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelKind {
    fn from(kind: &str) -> Self {
        Self(kind.to_string())
    }
}

impl From<String> for ModelKind {
    fn from(kind: String) -> Self {
        Self(kind)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-entity replay target.
///
/// A model is bound to one entity for its whole lifetime. The pipeline calls
/// [`process_message`](Model::process_message) once per message of that
/// entity, in merged-stream order, and never concurrently with itself.
#[async_trait]
pub trait Model: Send + Sync + 'static {
    /// Applies one mutation to the model's derived state.
    async fn process_message(&mut self, message: &ModelMessage) -> ModelResult<()>;

    /// Returns `self` for typed access through [`downcast_ref`](dyn Model::downcast_ref).
    fn as_any(&self) -> &dyn Any;
}

impl dyn Model {
    /// Returns the concrete model, if it is an `M`.
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

/// A model that declares its own kind and constructor, for
/// [`ModelFactory::register`](crate::ModelFactory::register).
pub trait ModelType: Model + Sized {
    const KIND: &'static str;

    fn create(context: ModelContext) -> Self;
}

/// Write-back path from a model to the shared output feed.
///
/// Implemented by the pipeline; the returned position confirms the message
/// was appended locally, not that it has been merged.
#[async_trait]
pub trait MutationWriter: Send + Sync {
    async fn write_mutation(&self, mutation: serde_json::Value) -> ModelResult<FeedPosition>;
}

/// Everything a model is given at construction.
#[derive(Clone)]
pub struct ModelContext {
    entity_id: EntityId,
    kind: ModelKind,
    writer: Option<Arc<dyn MutationWriter>>,
}

impl ModelContext {
    pub fn new(
        entity_id: EntityId,
        kind: ModelKind,
        writer: Option<Arc<dyn MutationWriter>>,
    ) -> Self {
        Self {
            entity_id,
            kind,
            writer,
        }
    }

    /// Context without a write-back path.
    pub fn read_only(entity_id: EntityId, kind: ModelKind) -> Self {
        Self::new(entity_id, kind, None)
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Proposes a mutation for this entity.
    ///
    /// The mutation is not applied here; the model sees it when it arrives
    /// back on its input stream.
    pub async fn write<M: Serialize + Sync>(&self, mutation: &M) -> ModelResult<FeedPosition> {
        let writer = self.writer.as_ref().ok_or(ModelError::ReadOnly)?;
        let value = serde_json::to_value(mutation)?;
        writer.write_mutation(value).await
    }
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("entity_id", &self.entity_id)
            .field("kind", &self.kind)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}
