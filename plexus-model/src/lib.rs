//! Message envelopes and replay models for Plexus.
//!
//! Defines the contract between the merged feed stream and the typed state
//! built from it:
//! - [`Envelope`] / [`Payload`]: the closed set of message kinds carried by feeds
//! - [`ModelMessage`]: an entity mutation as delivered to a model
//! - [`Model`]: the per-entity replay target
//! - [`ModelFactory`]: registry of model constructors keyed by [`ModelKind`]
//! - [`ObjectModel`]: a built-in key/value model
//!
//! A model sees every message of its entity exactly once, in merged-stream
//! order. Writes made through [`ModelContext::write`] are proposals: they take
//! effect when the written mutation comes back through the merged stream.

mod envelope;
mod factory;
mod model;
mod object;

pub use envelope::{Envelope, MessageMeta, ModelMessage, Payload};
pub use factory::{ModelConstructor, ModelFactory};
pub use model::{Model, ModelContext, ModelKind, ModelType, MutationWriter};
pub use object::{ObjectModel, ObjectMutation};

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while registering, constructing or replaying models.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model already registered: {0}")]
    RegistrationConflict(ModelKind),

    #[error("unknown model: {0}")]
    UnknownModel(ModelKind),

    #[error("invalid mutation: {0}")]
    InvalidMutation(#[from] serde_json::Error),

    #[error("mutation rejected: {0}")]
    Rejected(String),

    #[error("model is read-only")]
    ReadOnly,

    #[error("write failed: {0}")]
    Write(String),
}
