//! Feed abstractions.
//!
//! A feed is an append-only log written by one writer. The pipeline never
//! stores feeds itself: it pulls batches through [`FeedReader`]s handed out by
//! a [`FeedSource`], and appends through a [`FeedWriter`].

pub mod memory;

use crate::error::FeedError;
use async_trait::async_trait;
use plexus_types::{FeedKey, FeedPosition, Seq};
use tokio::sync::mpsc;

/// One message read from a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBlock<T> {
    pub feed_key: FeedKey,
    pub seq: Seq,
    pub data: T,
}

impl<T> FeedBlock<T> {
    pub fn new(feed_key: FeedKey, seq: Seq, data: T) -> Self {
        Self {
            feed_key,
            seq,
            data,
        }
    }

    /// Returns where this block sits in its feed.
    pub fn position(&self) -> FeedPosition {
        FeedPosition::new(self.feed_key.clone(), self.seq)
    }
}

/// Pull-based reader over a single feed.
#[async_trait]
pub trait FeedReader<T>: Send {
    /// Waits for the next batch of messages, in feed order.
    ///
    /// Returns `Ok(None)` once the feed is closed and fully read.
    async fn next_batch(&mut self) -> Result<Option<Vec<FeedBlock<T>>>, FeedError>;
}

/// A feed together with a reader positioned at its start.
pub struct FeedDescriptor<T> {
    pub key: FeedKey,
    pub reader: Box<dyn FeedReader<T>>,
}

impl<T> FeedDescriptor<T> {
    pub fn new(key: FeedKey, reader: impl FeedReader<T> + 'static) -> Self {
        Self {
            key,
            reader: Box::new(reader),
        }
    }
}

impl<T> std::fmt::Debug for FeedDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedDescriptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a source's feeds plus a channel of feeds opened later.
pub struct FeedWatch<T> {
    pub existing: Vec<FeedDescriptor<T>>,
    /// Yields feeds opened after the snapshot. Ends when the source stops
    /// announcing feeds.
    pub discovered: mpsc::UnboundedReceiver<FeedDescriptor<T>>,
}

/// Hands out readers for every feed it knows about.
pub trait FeedSource<T>: Send + Sync {
    /// Returns the current feeds and subscribes to later ones. No feed is
    /// missed or announced twice between the snapshot and the channel.
    fn watch(&self) -> FeedWatch<T>;
}

/// Appends messages to one feed.
#[async_trait]
pub trait FeedWriter<T>: Send + Sync {
    /// The feed this writer appends to.
    fn feed_key(&self) -> &FeedKey;

    /// Appends a message and returns its position.
    async fn write(&self, data: T) -> Result<FeedPosition, FeedError>;
}
