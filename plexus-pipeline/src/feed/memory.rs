//! In-memory feed store.
//!
//! Keeps every feed as a `Vec` behind a lock. Readers are live: once they
//! reach the end of a feed they wait on a `watch` signal for more appends or
//! for the feed to close. Used by tests and by embedders that replicate feeds
//! elsewhere and only need the merge.

use super::{FeedBlock, FeedDescriptor, FeedReader, FeedSource, FeedWatch, FeedWriter};
use crate::config::{DEFAULT_BATCH_SIZE, PipelineConfig};
use crate::error::FeedError;
use async_trait::async_trait;
use plexus_types::{FeedKey, FeedPosition, Seq};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
struct LogState {
    len: usize,
    closed: bool,
}

struct FeedLog<T> {
    key: FeedKey,
    messages: RwLock<Vec<T>>,
    state: watch::Sender<LogState>,
}

impl<T: Clone> FeedLog<T> {
    fn new(key: FeedKey) -> Self {
        let (state, _) = watch::channel(LogState::default());
        Self {
            key,
            messages: RwLock::new(Vec::new()),
            state,
        }
    }

    fn read_range(&self, from: usize, to: usize) -> Vec<FeedBlock<T>> {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        messages[from..to]
            .iter()
            .enumerate()
            .map(|(offset, data)| {
                FeedBlock::new(self.key.clone(), (from + offset) as Seq, data.clone())
            })
            .collect()
    }
}

struct StoreState<T> {
    feeds: Vec<Arc<FeedLog<T>>>,
    watchers: Vec<mpsc::UnboundedSender<FeedDescriptor<T>>>,
    discovery_closed: bool,
}

/// Shared in-memory collection of feeds.
///
/// Cloning the store is cheap; clones share the same feeds.
pub struct MemoryFeedStore<T> {
    batch_size: usize,
    state: Arc<Mutex<StoreState<T>>>,
}

impl<T> Clone for MemoryFeedStore<T> {
    fn clone(&self) -> Self {
        Self {
            batch_size: self.batch_size,
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for MemoryFeedStore<T> {
    fn default() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }
}

impl<T: Clone + Send + Sync + 'static> MemoryFeedStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose readers return at most `batch_size` messages
    /// per batch (minimum 1).
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            state: Arc::new(Mutex::new(StoreState {
                feeds: Vec::new(),
                watchers: Vec::new(),
                discovery_closed: false,
            })),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_batch_size(config.feed_batch_size)
    }

    /// Opens `key` for writing, creating the feed if needed.
    ///
    /// A new feed is announced to every active watcher.
    pub fn open_feed(&self, key: FeedKey) -> MemoryFeed<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(log) = state.feeds.iter().find(|log| log.key == key) {
            return MemoryFeed {
                log: Arc::clone(log),
            };
        }

        let log = Arc::new(FeedLog::new(key.clone()));
        state.feeds.push(Arc::clone(&log));
        let batch_size = self.batch_size;
        state.watchers.retain(|watcher| {
            watcher
                .send(FeedDescriptor::new(
                    key.clone(),
                    MemoryFeedReader::new(Arc::clone(&log), batch_size),
                ))
                .is_ok()
        });
        debug!("opened feed {key}");
        MemoryFeed { log }
    }

    /// Returns a writer for an already open feed.
    pub fn feed(&self, key: &FeedKey) -> Option<MemoryFeed<T>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .feeds
            .iter()
            .find(|log| &log.key == key)
            .map(|log| MemoryFeed {
                log: Arc::clone(log),
            })
    }

    /// Keys of all open feeds, in opening order.
    pub fn keys(&self) -> Vec<FeedKey> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.feeds.iter().map(|log| log.key.clone()).collect()
    }

    /// Stops announcing new feeds. Discovery channels of existing watchers end.
    pub fn close_discovery(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.discovery_closed = true;
        state.watchers.clear();
    }
}

impl<T: Clone + Send + Sync + 'static> FeedSource<T> for MemoryFeedStore<T> {
    fn watch(&self) -> FeedWatch<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = state
            .feeds
            .iter()
            .map(|log| {
                FeedDescriptor::new(
                    log.key.clone(),
                    MemoryFeedReader::new(Arc::clone(log), self.batch_size),
                )
            })
            .collect();

        let (tx, discovered) = mpsc::unbounded_channel();
        if !state.discovery_closed {
            state.watchers.push(tx);
        }
        FeedWatch {
            existing,
            discovered,
        }
    }
}

/// Write handle for one in-memory feed.
pub struct MemoryFeed<T> {
    log: Arc<FeedLog<T>>,
}

impl<T> Clone for MemoryFeed<T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> MemoryFeed<T> {
    pub fn key(&self) -> &FeedKey {
        &self.log.key
    }

    pub fn len(&self) -> usize {
        self.log.state.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.log.state.borrow().closed
    }

    /// Appends a message without waiting.
    pub fn append(&self, data: T) -> Result<FeedPosition, FeedError> {
        if self.is_closed() {
            return Err(FeedError::Closed(self.log.key.clone()));
        }
        let len = {
            let mut messages = self
                .log
                .messages
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            messages.push(data);
            messages.len()
        };
        self.log
            .state
            .send_modify(|state| state.len = state.len.max(len));
        Ok(FeedPosition::new(self.log.key.clone(), (len - 1) as Seq))
    }

    /// Closes the feed. Readers drain what is left and then end.
    pub fn close(&self) {
        self.log.state.send_modify(|state| state.closed = true);
        debug!("closed feed {}", self.log.key);
    }

    /// Returns a copy of every message in the feed.
    pub fn messages(&self) -> Vec<T> {
        self.log
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> FeedWriter<T> for MemoryFeed<T> {
    fn feed_key(&self) -> &FeedKey {
        &self.log.key
    }

    async fn write(&self, data: T) -> Result<FeedPosition, FeedError> {
        self.append(data)
    }
}

/// Live reader over one in-memory feed.
pub struct MemoryFeedReader<T> {
    log: Arc<FeedLog<T>>,
    state: watch::Receiver<LogState>,
    cursor: usize,
    batch_size: usize,
}

impl<T: Clone> MemoryFeedReader<T> {
    fn new(log: Arc<FeedLog<T>>, batch_size: usize) -> Self {
        let state = log.state.subscribe();
        Self {
            log,
            state,
            cursor: 0,
            batch_size,
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> FeedReader<T> for MemoryFeedReader<T> {
    async fn next_batch(&mut self) -> Result<Option<Vec<FeedBlock<T>>>, FeedError> {
        loop {
            let state = *self.state.borrow_and_update();
            if state.len > self.cursor {
                let end = state.len.min(self.cursor + self.batch_size);
                let batch = self.log.read_range(self.cursor, end);
                self.cursor = end;
                return Ok(Some(batch));
            }
            if state.closed {
                return Ok(None);
            }
            if self.state.changed().await.is_err() {
                return Ok(None);
            }
        }
    }
}
