//! Routes merged messages by kind and by entity.

use crate::admission::AdmissionSet;
use crate::entity::{EntityDescriptor, EntityManager};
use crate::error::{PipelineError, PipelineResult};
use crate::feed::FeedBlock;
use crate::observer::{Observers, Subscription};
use plexus_model::{Envelope, MessageMeta, ModelMessage, Payload};
use plexus_types::EntityId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A merged message of the custom kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomMessage {
    pub meta: MessageMeta,
    pub tag: String,
    pub data: serde_json::Value,
}

enum EntityStream {
    /// Messages arrived before the genesis; buffered until construction.
    Buffering {
        tx: mpsc::UnboundedSender<ModelMessage>,
        rx: mpsc::UnboundedReceiver<ModelMessage>,
    },
    Live(mpsc::UnboundedSender<ModelMessage>),
    /// Construction failed; further messages are dropped.
    Failed,
}

impl EntityStream {
    fn buffering() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::Buffering { tx, rx }
    }
}

/// Splits the merged stream.
///
/// Control messages update the [`AdmissionSet`], entity messages go to one
/// unbounded stream per entity, and custom messages go to observers. Streams
/// are created lazily by the first message naming the entity, so mutations
/// merged before their genesis are kept.
pub struct Demultiplexer {
    manager: Arc<EntityManager>,
    admission: AdmissionSet,
    streams: HashMap<EntityId, EntityStream>,
    custom: Observers<CustomMessage>,
}

impl Demultiplexer {
    pub fn new(manager: Arc<EntityManager>, admission: AdmissionSet) -> Self {
        Self {
            manager,
            admission,
            streams: HashMap::new(),
            custom: Observers::new(),
        }
    }

    /// Registers a callback for custom messages.
    pub fn on_custom_message(
        &self,
        callback: impl Fn(&CustomMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.custom.subscribe(callback)
    }

    /// Routes one merged message.
    ///
    /// Only protocol violations are returned as errors. A genesis whose model
    /// is unknown is logged and the entity stays unconstructed.
    pub fn process(&mut self, block: FeedBlock<Envelope>) -> PipelineResult<()> {
        let FeedBlock {
            feed_key,
            seq,
            data: Envelope { timestamp, payload },
        } = block;
        let meta = MessageMeta {
            feed_key,
            seq,
            timestamp,
        };

        match payload {
            Payload::Admit { feed_key } => {
                self.admission.admit(feed_key);
                Ok(())
            }
            Payload::Remove { feed_key } => {
                self.admission.remove(&feed_key);
                Ok(())
            }
            Payload::Genesis {
                entity_id,
                entity_type,
                model_kind,
                parent_id,
                mutation,
            } => {
                let descriptor = EntityDescriptor {
                    id: entity_id,
                    entity_type,
                    model_kind,
                    parent_id,
                };
                self.genesis(descriptor, meta, mutation)
            }
            Payload::Mutation {
                entity_id,
                mutation,
            } => self.mutation(entity_id, ModelMessage { meta, mutation }),
            Payload::Custom { tag, data } => {
                self.custom.notify(&CustomMessage { meta, tag, data });
                Ok(())
            }
        }
    }

    fn genesis(
        &mut self,
        descriptor: EntityDescriptor,
        meta: MessageMeta,
        initial: Option<serde_json::Value>,
    ) -> PipelineResult<()> {
        let id = descriptor.id;
        check_entity_id(id, "genesis")?;

        let (mut tx, mut rx) = match self.streams.remove(&id) {
            None => mpsc::unbounded_channel(),
            Some(EntityStream::Buffering { tx, rx }) => (tx, rx),
            Some(stream) => {
                self.streams.insert(id, stream);
                return Err(PipelineError::ProtocolViolation(format!(
                    "second genesis for entity {id} at {}",
                    meta.position()
                )));
            }
        };

        if let Some(mutation) = initial {
            // The initial mutation goes ahead of anything buffered earlier.
            let (first_tx, first_rx) = mpsc::unbounded_channel();
            let _ = first_tx.send(ModelMessage { meta, mutation });
            while let Ok(message) = rx.try_recv() {
                let _ = first_tx.send(message);
            }
            tx = first_tx;
            rx = first_rx;
        }

        match self.manager.construct_entity(descriptor, rx) {
            Ok(_) => {
                self.streams.insert(id, EntityStream::Live(tx));
                Ok(())
            }
            Err(PipelineError::Model(e)) => {
                warn!("entity {id} left unconstructed: {e}");
                self.streams.insert(id, EntityStream::Failed);
                Ok(())
            }
            Err(e) => {
                self.streams.insert(id, EntityStream::Failed);
                Err(e)
            }
        }
    }

    fn mutation(&mut self, id: EntityId, message: ModelMessage) -> PipelineResult<()> {
        check_entity_id(id, "mutation")?;

        let stream = match self.streams.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("buffering mutation for unconstructed entity {id}");
                entry.insert(EntityStream::buffering())
            }
        };
        match stream {
            EntityStream::Buffering { tx, .. } | EntityStream::Live(tx) => {
                if tx.send(message).is_err() {
                    debug!("replay for entity {id} has ended, dropping mutation");
                }
            }
            EntityStream::Failed => {
                debug!(
                    "dropping mutation {} for failed entity {id}",
                    message.meta.position()
                );
            }
        }
        Ok(())
    }
}

fn check_entity_id(id: EntityId, kind: &str) -> PipelineResult<()> {
    if id.is_nil() {
        return Err(PipelineError::ProtocolViolation(format!(
            "{kind} message without entity id"
        )));
    }
    Ok(())
}
