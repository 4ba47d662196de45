//! Core type definitions for Plexus.
//!
//! This crate defines the identifiers shared by every other crate:
//! - Feed keys (opaque byte strings naming an append-only log)
//! - Node ids (byte strings naming a vector-clock node, usually a feed key)
//! - Entity identifiers (UUID v7)
//! - Feed positions (feed key + sequence)
//!
//! Message envelopes and models live in `plexus-model`; clocks live in
//! `plexus-clock`.

mod ids;
mod keys;
mod position;

pub use ids::EntityId;
pub use keys::{FeedKey, NodeId, KEY_LENGTH};
pub use position::FeedPosition;

/// Zero-based position of a message within its feed.
pub type Seq = u64;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid hex key: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
