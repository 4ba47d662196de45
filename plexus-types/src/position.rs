use crate::{FeedKey, Seq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a message: the feed it was appended to and its index there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedPosition {
    pub feed_key: FeedKey,
    pub seq: Seq,
}

impl FeedPosition {
    #[must_use]
    pub fn new(feed_key: FeedKey, seq: Seq) -> Self {
        Self { feed_key, seq }
    }
}

impl fmt::Display for FeedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.feed_key, self.seq)
    }
}
