//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Default number of messages a feed reader returns per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Configuration for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum messages per reader batch. Also bounds read-ahead on a
    /// frozen feed.
    pub feed_batch_size: usize,
    /// Admit the local writer's feed at construction so local writes echo
    /// back through the merge.
    pub admit_local_feed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed_batch_size: DEFAULT_BATCH_SIZE,
            admit_local_feed: true,
        }
    }
}
