//! Feed merging and entity replay for Plexus.
//!
//! Takes many append-only feeds, merges the admitted ones into a single
//! ordered stream, splits that stream by entity and rebuilds each entity's
//! state by replaying its mutations through a model.
//!
//! ## Components
//!
//! - **Feed**: reader/writer/source traits and an in-memory store
//! - **Merger**: ordered fan-in with a dynamic selector and tie-break
//! - **Admission**: the admitted feed set, changed by control messages
//! - **Demux**: routes merged messages to admission, entities and observers
//! - **Entity**: entity handles, creation protocol and per-entity replay
//! - **Pipeline**: wires everything for one node
//!
//! # Example
//!
//! ```no_run
//! use plexus_model::{Envelope, ModelFactory, ObjectModel};
//! use plexus_pipeline::{AdmissionSet, MemoryFeedStore, Pipeline, PipelineConfig};
//! use plexus_types::FeedKey;
//! use std::sync::Arc;
//!
//! # async fn demo() -> plexus_pipeline::PipelineResult<()> {
//! let store = MemoryFeedStore::<Envelope>::new();
//! let local = store.open_feed(FeedKey::random());
//!
//! let factory = Arc::new(ModelFactory::new());
//! factory.register::<ObjectModel>()?;
//!
//! let pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     &store,
//!     factory,
//!     AdmissionSet::new(),
//!     Some(Arc::new(local)),
//! );
//! let running = pipeline.spawn();
//! let entity = running.manager().create_entity("note", "plexus:model/object").await?;
//! # let _ = entity;
//! # running.shutdown().await
//! # }
//! ```

mod admission;
mod config;
mod demux;
mod entity;
mod error;
pub mod feed;
pub mod merger;
mod observer;
mod pipeline;

pub use admission::AdmissionSet;
pub use config::{DEFAULT_BATCH_SIZE, PipelineConfig};
pub use demux::{CustomMessage, Demultiplexer};
pub use entity::{Entity, EntityDescriptor, EntityFilter, EntityManager, EntityOptions};
pub use error::{FeedError, PipelineError, PipelineResult};
pub use feed::memory::{MemoryFeed, MemoryFeedReader, MemoryFeedStore};
pub use feed::{FeedBlock, FeedDescriptor, FeedReader, FeedSource, FeedWatch, FeedWriter};
pub use merger::{FeedMerger, MergerHandle, Selector, TieBreak, tie_break};
pub use observer::{Observers, Subscription};
pub use pipeline::{Pipeline, PipelineHandle};
