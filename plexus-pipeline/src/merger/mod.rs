//! Ordered fan-in over many feeds.
//!
//! [`FeedMerger`] pulls batches from every tracked feed and yields their
//! messages as a single sequence. Within a feed, order is preserved. Across
//! feeds, the tie-break decides which queue head goes next.
//!
//! # Loop
//!
//! Each call to [`FeedMerger::next`]:
//!
//! 1. Tracks feeds announced on the source's discovery channel
//! 2. Re-evaluates the selector: failing feeds are frozen, passing feeds thawed
//! 3. Offers the head of each unfrozen, non-empty queue to the tie-break
//! 4. If nothing was chosen, starts one fetch per idle feed with an empty
//!    queue and waits for a fetch, a discovery, an admission change or stop

pub mod tie_break;

use crate::feed::{FeedBlock, FeedDescriptor, FeedReader, FeedSource};
use crate::error::FeedError;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use plexus_types::FeedKey;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

/// Decides whether a feed may currently emit.
pub type Selector = Arc<dyn Fn(&FeedKey) -> bool + Send + Sync>;

/// Picks which candidate to emit next, or `None` to wait.
///
/// Candidates are the queue heads of the unfrozen feeds, in tracking order.
/// The slice is never empty.
pub type TieBreak<T> = Box<dyn FnMut(&[&FeedBlock<T>]) -> Option<usize> + Send>;

type FetchOutput<T> = (
    usize,
    Box<dyn FeedReader<T>>,
    Result<Option<Vec<FeedBlock<T>>>, FeedError>,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedState {
    Idle,
    Fetching,
    Closed,
    Stalled,
}

struct TrackedFeed<T> {
    key: FeedKey,
    queue: VecDeque<FeedBlock<T>>,
    /// `None` while a fetch owns the reader, and after close or stall.
    reader: Option<Box<dyn FeedReader<T>>>,
    state: FeedState,
    frozen: bool,
}

impl<T> TrackedFeed<T> {
    fn is_finished(&self) -> bool {
        self.queue.is_empty() && matches!(self.state, FeedState::Closed | FeedState::Stalled)
    }
}

#[derive(Default)]
struct StopSignal {
    requested: AtomicBool,
    notify: Notify,
}

/// Stops a [`FeedMerger`] from another task.
#[derive(Clone)]
pub struct MergerHandle {
    signal: Arc<StopSignal>,
}

impl MergerHandle {
    /// Requests stop. The merger's next (or current) `next()` returns `None`.
    pub fn stop(&self) {
        self.signal.requested.store(true, Ordering::SeqCst);
        self.signal.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.requested.load(Ordering::SeqCst)
    }
}

enum Wake<T> {
    Stop,
    Fetched(FetchOutput<T>),
    Discovered(Option<FeedDescriptor<T>>),
    Changed,
}

/// Merges many feeds into one ordered sequence.
///
/// Single pass: once `next()` returns `None` it keeps returning `None`.
pub struct FeedMerger<T> {
    feeds: Vec<TrackedFeed<T>>,
    selector: Selector,
    tie_break: TieBreak<T>,
    fetches: FuturesUnordered<BoxFuture<'static, FetchOutput<T>>>,
    discovered: Option<mpsc::UnboundedReceiver<FeedDescriptor<T>>>,
    wake: Arc<Notify>,
    stop: Arc<StopSignal>,
    done: bool,
}

impl<T: Send + 'static> FeedMerger<T> {
    /// Creates a merger over every feed `source` has now or opens later.
    pub fn new<S>(source: &S, selector: Selector, tie_break: TieBreak<T>) -> Self
    where
        S: FeedSource<T> + ?Sized,
    {
        let watch = source.watch();
        let mut merger = Self {
            feeds: Vec::new(),
            selector,
            tie_break,
            fetches: FuturesUnordered::new(),
            discovered: Some(watch.discovered),
            wake: Arc::new(Notify::new()),
            stop: Arc::new(StopSignal::default()),
            done: false,
        };
        for descriptor in watch.existing {
            merger.track(descriptor);
        }
        merger
    }

    /// Wakes the merger whenever `notify` fires, so selector changes are
    /// picked up while it waits for data.
    #[must_use]
    pub fn with_wake(mut self, notify: Arc<Notify>) -> Self {
        self.wake = notify;
        self
    }

    /// Replaces the tie-break policy.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak<T>) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Returns a handle that can stop this merger.
    pub fn handle(&self) -> MergerHandle {
        MergerHandle {
            signal: Arc::clone(&self.stop),
        }
    }

    /// Keys of tracked feeds, in tracking order.
    pub fn tracked_feeds(&self) -> Vec<FeedKey> {
        self.feeds.iter().map(|feed| feed.key.clone()).collect()
    }

    /// Returns the next merged message, or `None` once stopped or exhausted.
    pub async fn next(&mut self) -> Option<FeedBlock<T>> {
        loop {
            if self.done {
                return None;
            }
            if self.stop.requested.load(Ordering::SeqCst) {
                self.finish("stop requested");
                return None;
            }

            self.drain_discovered();
            self.refresh_selection();
            if let Some(block) = self.pick() {
                return Some(block);
            }

            self.start_fetches();
            if self.is_exhausted() {
                self.finish("all feeds exhausted");
                return None;
            }

            let wake = tokio::select! {
                biased;
                () = self.stop.notify.notified() => Wake::Stop,
                Some(output) = self.fetches.next(), if !self.fetches.is_empty() => Wake::Fetched(output),
                descriptor = recv_discovered(&mut self.discovered) => Wake::Discovered(descriptor),
                () = self.wake.notified() => Wake::Changed,
            };

            match wake {
                Wake::Stop | Wake::Changed => {}
                Wake::Fetched(output) => self.accept_fetch(output),
                Wake::Discovered(Some(descriptor)) => self.track(descriptor),
                Wake::Discovered(None) => {
                    debug!("feed discovery closed");
                    self.discovered = None;
                }
            }
        }
    }

    /// Wraps the merger in a `Stream`. No extra buffering is added.
    pub fn into_stream(self) -> impl Stream<Item = FeedBlock<T>> + Send {
        futures::stream::unfold(self, |mut merger| async move {
            merger.next().await.map(|block| (block, merger))
        })
    }

    fn track(&mut self, descriptor: FeedDescriptor<T>) {
        if self.feeds.iter().any(|feed| feed.key == descriptor.key) {
            warn!("feed {} announced twice, ignoring", descriptor.key);
            return;
        }
        let frozen = !(self.selector)(&descriptor.key);
        debug!(
            "tracking feed {}{}",
            descriptor.key,
            if frozen { " (frozen)" } else { "" }
        );
        self.feeds.push(TrackedFeed {
            key: descriptor.key,
            queue: VecDeque::new(),
            reader: Some(descriptor.reader),
            state: FeedState::Idle,
            frozen,
        });
    }

    fn drain_discovered(&mut self) {
        let mut announced = Vec::new();
        let mut closed = false;
        if let Some(rx) = self.discovered.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(descriptor) => announced.push(descriptor),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        for descriptor in announced {
            self.track(descriptor);
        }
        if closed {
            debug!("feed discovery closed");
            self.discovered = None;
        }
    }

    fn refresh_selection(&mut self) {
        for feed in &mut self.feeds {
            let frozen = !(self.selector)(&feed.key);
            if frozen != feed.frozen {
                feed.frozen = frozen;
                if frozen {
                    debug!("froze feed {} with {} queued", feed.key, feed.queue.len());
                } else {
                    debug!("thawed feed {} with {} queued", feed.key, feed.queue.len());
                }
            }
        }
    }

    fn pick(&mut self) -> Option<FeedBlock<T>> {
        let candidates: Vec<usize> = self
            .feeds
            .iter()
            .enumerate()
            .filter(|(_, feed)| !feed.frozen && !feed.queue.is_empty())
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let heads: Vec<&FeedBlock<T>> = candidates
            .iter()
            .filter_map(|&index| self.feeds[index].queue.front())
            .collect();
        let choice = (self.tie_break)(heads.as_slice())?;

        match candidates.get(choice) {
            Some(&index) => self.feeds[index].queue.pop_front(),
            None => {
                warn!(
                    "tie-break chose candidate {choice} of {}, waiting instead",
                    candidates.len()
                );
                None
            }
        }
    }

    fn start_fetches(&mut self) {
        for (index, feed) in self.feeds.iter_mut().enumerate() {
            if feed.frozen || !feed.queue.is_empty() || feed.state != FeedState::Idle {
                continue;
            }
            let Some(mut reader) = feed.reader.take() else {
                continue;
            };
            feed.state = FeedState::Fetching;
            self.fetches.push(Box::pin(async move {
                let result = reader.next_batch().await;
                (index, reader, result)
            }));
        }
    }

    fn accept_fetch(&mut self, (index, reader, result): FetchOutput<T>) {
        let Some(feed) = self.feeds.get_mut(index) else {
            return;
        };
        match result {
            Ok(Some(batch)) => {
                feed.queue.extend(batch);
                feed.reader = Some(reader);
                feed.state = FeedState::Idle;
            }
            Ok(None) => {
                debug!("feed {} closed with {} queued", feed.key, feed.queue.len());
                feed.state = FeedState::Closed;
            }
            Err(e) => {
                warn!("feed {} stalled: {e}", feed.key);
                feed.state = FeedState::Stalled;
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.discovered.is_none()
            && self.fetches.is_empty()
            && self.feeds.iter().all(TrackedFeed::is_finished)
    }

    fn finish(&mut self, reason: &str) {
        self.done = true;
        // In-flight fetches are abandoned with their readers.
        self.fetches = FuturesUnordered::new();
        info!("merge ended: {reason}");
    }
}

async fn recv_discovered<T>(
    rx: &mut Option<mpsc::UnboundedReceiver<FeedDescriptor<T>>>,
) -> Option<FeedDescriptor<T>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
