//! Error types for the pipeline.

use plexus_model::ModelError;
use plexus_types::FeedKey;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by feed readers and writers.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed no longer accepts writes.
    #[error("feed closed: {0}")]
    Closed(FeedKey),

    /// Reading the next batch failed. The merger stalls the feed.
    #[error("read failed on feed {feed}: {reason}")]
    Read { feed: FeedKey, reason: String },

    /// Appending to the feed failed.
    #[error("write failed: {0}")]
    Write(String),
}

/// Errors that can occur while merging, routing or replaying messages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A message broke the envelope protocol (nil entity id, duplicate
    /// genesis). Not recoverable by waiting.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Model registration, construction or replay error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Feed read or write error.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// No output feed is configured, so nothing can be proposed.
    #[error("pipeline has no writable feed")]
    ReadOnly,

    /// The pipeline shut down before the operation completed.
    #[error("pipeline stopped")]
    Stopped,
}
