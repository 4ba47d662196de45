//! The set of feeds admitted to the merge.

use crate::merger::Selector;
use plexus_types::FeedKey;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Notify;
use tracing::info;

#[derive(Default)]
struct AdmissionInner {
    feeds: RwLock<HashSet<FeedKey>>,
    changed: Arc<Notify>,
}

/// Shared, mutable set of admitted feed keys.
///
/// Updated by control messages that come out of the merge and read by the
/// merger's selector. Every actual change fires a [`Notify`] so a waiting
/// merger re-evaluates which feeds are frozen.
#[derive(Clone, Default)]
pub struct AdmissionSet {
    inner: Arc<AdmissionInner>,
}

impl AdmissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with `feeds` already admitted.
    pub fn with_feeds(feeds: impl IntoIterator<Item = FeedKey>) -> Self {
        let set = Self::new();
        set.inner
            .feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(feeds);
        set
    }

    /// Admits a feed. Returns `false` if it was already admitted.
    pub fn admit(&self, key: FeedKey) -> bool {
        let added = self
            .inner
            .feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if added {
            info!("admitted feed {key}");
            self.inner.changed.notify_one();
        }
        added
    }

    /// Removes a feed. Returns `false` if it was not admitted.
    pub fn remove(&self, key: &FeedKey) -> bool {
        let removed = self
            .inner
            .feeds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed {
            info!("removed feed {key}");
            self.inner.changed.notify_one();
        }
        removed
    }

    pub fn contains(&self, key: &FeedKey) -> bool {
        self.inner
            .feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Admitted keys, sorted.
    pub fn feeds(&self) -> Vec<FeedKey> {
        let mut feeds: Vec<_> = self
            .inner
            .feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        feeds.sort();
        feeds
    }

    pub fn len(&self) -> usize {
        self.inner
            .feeds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A merger selector that passes admitted feeds.
    pub fn selector(&self) -> Selector {
        let set = self.clone();
        Arc::new(move |key: &FeedKey| set.contains(key))
    }

    /// Signal fired on every change, for [`FeedMerger::with_wake`](crate::FeedMerger::with_wake).
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.inner.changed)
    }
}

impl std::fmt::Debug for AdmissionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSet")
            .field("feeds", &self.feeds())
            .finish()
    }
}
