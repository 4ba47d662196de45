//! Wires merger, demultiplexer and entity manager together.

use crate::admission::AdmissionSet;
use crate::config::PipelineConfig;
use crate::demux::{CustomMessage, Demultiplexer};
use crate::entity::EntityManager;
use crate::error::{PipelineError, PipelineResult};
use crate::feed::{FeedSource, FeedWriter};
use crate::merger::{FeedMerger, MergerHandle, TieBreak, tie_break};
use crate::observer::Subscription;
use plexus_model::{Envelope, ModelFactory};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One node's view of a shared space of feeds.
///
/// Merges the admitted feeds, routes each merged message, and replays
/// entities. The optional writer is the node's own output feed: entity
/// creation and model writes go there and come back through the merge.
pub struct Pipeline {
    config: PipelineConfig,
    merger: FeedMerger<Envelope>,
    demux: Demultiplexer,
    manager: Arc<EntityManager>,
    admission: AdmissionSet,
}

impl Pipeline {
    pub fn new<S>(
        config: PipelineConfig,
        source: &S,
        factory: Arc<ModelFactory>,
        admission: AdmissionSet,
        writer: Option<Arc<dyn FeedWriter<Envelope>>>,
    ) -> Self
    where
        S: FeedSource<Envelope> + ?Sized,
    {
        if config.admit_local_feed
            && let Some(writer) = &writer
        {
            admission.admit(writer.feed_key().clone());
        }

        let merger = FeedMerger::new(source, admission.selector(), tie_break::first())
            .with_wake(admission.notifier());
        let manager = Arc::new(EntityManager::new(factory, writer));
        let demux = Demultiplexer::new(Arc::clone(&manager), admission.clone());
        info!(
            "pipeline created with {} admitted of {} tracked feeds",
            admission.len(),
            merger.tracked_feeds().len()
        );

        Self {
            config,
            merger,
            demux,
            manager,
            admission,
        }
    }

    /// Replaces the merge tie-break. Every replica of a space must use the
    /// same policy to agree on entity state.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak<Envelope>) -> Self {
        self.merger = self.merger.with_tie_break(tie_break);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn manager(&self) -> Arc<EntityManager> {
        Arc::clone(&self.manager)
    }

    pub fn admission(&self) -> &AdmissionSet {
        &self.admission
    }

    /// Handle that stops the merge, ending [`run`](Self::run).
    pub fn handle(&self) -> MergerHandle {
        self.merger.handle()
    }

    pub fn on_custom_message(
        &self,
        callback: impl Fn(&CustomMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.demux.on_custom_message(callback)
    }

    /// Merges and routes one message. Returns `false` once the merge has ended.
    pub async fn process_next(&mut self) -> PipelineResult<bool> {
        match self.merger.next().await {
            Some(block) => {
                debug!(
                    "merged {} from {}",
                    block.data.payload.kind(),
                    block.position()
                );
                self.demux.process(block)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Processes messages until the merge ends or a protocol violation.
    ///
    /// Pending entity creations fail with [`PipelineError::Stopped`] when
    /// this returns.
    pub async fn run(mut self) -> PipelineResult<()> {
        let result = loop {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.manager.shutdown();
        info!("pipeline stopped");
        result
    }

    /// Runs the pipeline on a tokio task.
    pub fn spawn(self) -> PipelineHandle {
        let stop = self.handle();
        let manager = self.manager();
        let join = tokio::spawn(self.run());
        PipelineHandle {
            stop,
            manager,
            join,
        }
    }
}

/// A pipeline running on its own task.
pub struct PipelineHandle {
    stop: MergerHandle,
    manager: Arc<EntityManager>,
    join: JoinHandle<PipelineResult<()>>,
}

impl PipelineHandle {
    pub fn manager(&self) -> Arc<EntityManager> {
        Arc::clone(&self.manager)
    }

    /// Requests stop without waiting.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Waits for the pipeline task to finish.
    pub async fn join(self) -> PipelineResult<()> {
        self.join.await.map_err(|_| PipelineError::Stopped)?
    }

    /// Stops the pipeline and waits for it.
    pub async fn shutdown(self) -> PipelineResult<()> {
        self.stop();
        self.join().await
    }
}
