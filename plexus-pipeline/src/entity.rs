//! Entities and the entity manager.
//!
//! An entity is created by proposing a genesis message and waiting for it to
//! come back through the merge. Until then it does not exist locally, not
//! even for its creator. Once constructed, each entity owns one model and a
//! replay task that feeds it the entity's messages one at a time.

use crate::error::{PipelineError, PipelineResult};
use crate::feed::FeedWriter;
use crate::observer::{Observers, Subscription};
use async_trait::async_trait;
use plexus_clock::CausalClock;
use plexus_model::{
    Envelope, Model, ModelContext, ModelError, ModelFactory, ModelKind, ModelMessage,
    ModelResult, MutationWriter, Payload,
};
use plexus_types::{EntityId, FeedPosition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{RwLockReadGuard, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Identity of an entity, as carried by its genesis message.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub id: EntityId,
    pub entity_type: String,
    pub model_kind: ModelKind,
    pub parent_id: Option<EntityId>,
}

/// Replay progress of one entity.
#[derive(Debug, Clone, Default)]
struct ReplayState {
    observed: CausalClock,
    /// The entity's input stream has closed; nothing more will be replayed.
    ended: bool,
}

struct EntityInner {
    descriptor: EntityDescriptor,
    model: tokio::sync::RwLock<Box<dyn Model>>,
    replay: watch::Sender<ReplayState>,
    updated: Observers<Entity>,
}

/// Handle to a constructed entity. Cheap to clone.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    fn new(
        descriptor: EntityDescriptor,
        model: Box<dyn Model>,
        replay: watch::Sender<ReplayState>,
    ) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                descriptor,
                model: tokio::sync::RwLock::new(model),
                replay,
                updated: Observers::new(),
            }),
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.descriptor.id
    }

    pub fn entity_type(&self) -> &str {
        &self.inner.descriptor.entity_type
    }

    pub fn model_kind(&self) -> &ModelKind {
        &self.inner.descriptor.model_kind
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.inner.descriptor.parent_id
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.inner.descriptor
    }

    /// Read access to the model. Replay waits while the guard is held.
    pub async fn model(&self) -> RwLockReadGuard<'_, Box<dyn Model>> {
        self.inner.model.read().await
    }

    /// Runs `f` on the model if it is an `M`.
    pub async fn with_model<M: Model, R>(&self, f: impl FnOnce(&M) -> R) -> Option<R> {
        let model = self.inner.model.read().await;
        model.downcast_ref::<M>().map(f)
    }

    /// Clock of the messages replayed so far.
    pub fn observed(&self) -> CausalClock {
        self.inner.replay.borrow().observed.clone()
    }

    /// Returns true once the message at `position` has been replayed.
    pub fn has_replayed(&self, position: &FeedPosition) -> bool {
        self.inner.replay.borrow().observed.has_observed(position)
    }

    /// Waits until the message at `position` has been replayed.
    ///
    /// Used with the position returned by a model write to wait for the
    /// write to take effect. Fails with [`PipelineError::Stopped`] if replay
    /// ends before reaching `position`.
    pub async fn wait_for(&self, position: &FeedPosition) -> PipelineResult<()> {
        let mut replay = self.inner.replay.subscribe();
        let state = replay
            .wait_for(|state| state.ended || state.observed.has_observed(position))
            .await
            .map_err(|_| PipelineError::Stopped)?;
        if state.observed.has_observed(position) {
            Ok(())
        } else {
            Err(PipelineError::Stopped)
        }
    }

    /// Registers a callback fired after each replayed message.
    pub fn on_update(&self, callback: impl Fn(&Entity) + Send + Sync + 'static) -> Subscription {
        self.inner.updated.subscribe(callback)
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("entity_type", &self.entity_type())
            .field("model_kind", self.model_kind())
            .field("parent_id", &self.parent_id())
            .finish_non_exhaustive()
    }
}

/// Optional genesis fields for [`EntityManager::create_entity_with`].
#[derive(Debug, Clone, Default)]
pub struct EntityOptions {
    pub parent: Option<EntityId>,
    /// First mutation, replayed before anything else.
    pub mutation: Option<serde_json::Value>,
}

impl EntityOptions {
    #[must_use]
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the initial mutation from any serializable mutation type.
    pub fn with_mutation<M: serde::Serialize>(mut self, mutation: &M) -> ModelResult<Self> {
        self.mutation = Some(serde_json::to_value(mutation)?);
        Ok(self)
    }
}

/// Selects entities in [`EntityManager::get_entities`]. Empty criteria match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub types: Vec<String>,
    pub parent: Option<EntityId>,
    pub ids: Vec<EntityId>,
}

impl EntityFilter {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.types.push(entity_type.into());
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.ids.push(id);
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        (self.types.is_empty() || self.types.iter().any(|t| t == entity.entity_type()))
            && self.parent.is_none_or(|parent| entity.parent_id() == Some(parent))
            && (self.ids.is_empty() || self.ids.contains(&entity.id()))
    }
}

/// Write-back path handed to each model.
///
/// Stamps every mutation with the entity's observed clock, so concurrent
/// proposals can be ordered causally.
struct EntityWriter {
    entity_id: EntityId,
    feed: Arc<dyn FeedWriter<Envelope>>,
    replay: watch::Receiver<ReplayState>,
}

#[async_trait]
impl MutationWriter for EntityWriter {
    async fn write_mutation(&self, mutation: serde_json::Value) -> ModelResult<FeedPosition> {
        let timestamp = self.replay.borrow().observed.clone();
        let envelope = Envelope::mutation(self.entity_id, mutation).with_timestamp(timestamp);
        self.feed
            .write(envelope)
            .await
            .map_err(|e| ModelError::Write(e.to_string()))
    }
}

/// Constructs entities from genesis messages and tracks them.
pub struct EntityManager {
    factory: Arc<ModelFactory>,
    writer: Option<Arc<dyn FeedWriter<Envelope>>>,
    entities: RwLock<HashMap<EntityId, Entity>>,
    pending: Mutex<HashMap<EntityId, oneshot::Sender<Entity>>>,
    created: Observers<Entity>,
    updated: Observers<Entity>,
    stopped: AtomicBool,
}

impl EntityManager {
    /// Creates a manager. Without a writer, entities can be replayed but not
    /// created or mutated locally.
    pub fn new(factory: Arc<ModelFactory>, writer: Option<Arc<dyn FeedWriter<Envelope>>>) -> Self {
        Self {
            factory,
            writer,
            entities: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            created: Observers::new(),
            updated: Observers::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn factory(&self) -> &Arc<ModelFactory> {
        &self.factory
    }

    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    /// Creates an entity and waits for its genesis to be merged.
    pub async fn create_entity(
        &self,
        entity_type: impl Into<String>,
        model_kind: impl Into<ModelKind>,
    ) -> PipelineResult<Entity> {
        self.create_entity_with(entity_type, model_kind, EntityOptions::default())
            .await
    }

    /// Creates an entity with a parent and/or initial mutation.
    ///
    /// Writes a genesis message to the output feed and resolves only when
    /// that message has come back through the merge and the entity has been
    /// constructed. Fails fast if the model kind is not registered here.
    pub async fn create_entity_with(
        &self,
        entity_type: impl Into<String>,
        model_kind: impl Into<ModelKind>,
        options: EntityOptions,
    ) -> PipelineResult<Entity> {
        let model_kind = model_kind.into();
        if !self.factory.has_model(&model_kind) {
            return Err(ModelError::UnknownModel(model_kind).into());
        }
        let writer = self.writer.as_ref().ok_or(PipelineError::ReadOnly)?;

        let entity_id = EntityId::new();
        let (tx, rx) = oneshot::channel();
        {
            // Shutdown sets the flag under this lock.
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if self.stopped.load(Ordering::SeqCst) {
                return Err(PipelineError::Stopped);
            }
            pending.insert(entity_id, tx);
        }

        let genesis = Envelope::new(Payload::Genesis {
            entity_id,
            entity_type: entity_type.into(),
            model_kind: model_kind.clone(),
            parent_id: options.parent,
            mutation: options.mutation,
        });
        if let Err(e) = writer.write(genesis).await {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&entity_id);
            return Err(e.into());
        }
        debug!("wrote genesis for entity {entity_id} ({model_kind})");

        rx.await.map_err(|_| PipelineError::Stopped)
    }

    /// Constructs an entity from a merged genesis message.
    ///
    /// `input` carries the entity's messages in merged order. Fails with
    /// `UnknownModel` if the kind is not registered, and with a protocol
    /// violation if the id is nil or already constructed.
    pub fn construct_entity(
        &self,
        descriptor: EntityDescriptor,
        input: mpsc::UnboundedReceiver<ModelMessage>,
    ) -> PipelineResult<Entity> {
        let id = descriptor.id;
        if id.is_nil() {
            return Err(PipelineError::ProtocolViolation(
                "genesis with nil entity id".to_string(),
            ));
        }
        if self.contains(&id) {
            return Err(PipelineError::ProtocolViolation(format!(
                "entity {id} constructed twice"
            )));
        }

        let (replay, _) = watch::channel(ReplayState::default());
        let writer = self.writer.as_ref().map(|feed| {
            Arc::new(EntityWriter {
                entity_id: id,
                feed: Arc::clone(feed),
                replay: replay.subscribe(),
            }) as Arc<dyn MutationWriter>
        });
        let context = ModelContext::new(id, descriptor.model_kind.clone(), writer);
        let model = self.factory.create_model(context)?;

        let entity = Entity::new(descriptor, model, replay);
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entity.clone());
        tokio::spawn(self::replay(entity.clone(), input, self.updated.clone()));
        info!(
            "constructed entity {id} ({}, {})",
            entity.entity_type(),
            entity.model_kind()
        );

        self.created.notify(&entity);
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(tx) = pending {
            let _ = tx.send(entity.clone());
        }
        Ok(entity)
    }

    /// Returns a constructed entity. `None` while its genesis is unmerged.
    pub fn get_entity(&self, id: &EntityId) -> Option<Entity> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Snapshot of constructed entities matching `filter`, ordered by id.
    pub fn get_entities(&self, filter: &EntityFilter) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entity| filter.matches(entity))
            .cloned()
            .collect();
        entities.sort_by_key(Entity::id);
        entities
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of local creations still waiting for their genesis echo.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn on_entity_created(
        &self,
        callback: impl Fn(&Entity) + Send + Sync + 'static,
    ) -> Subscription {
        self.created.subscribe(callback)
    }

    pub fn on_entity_updated(
        &self,
        callback: impl Fn(&Entity) + Send + Sync + 'static,
    ) -> Subscription {
        self.updated.subscribe(callback)
    }

    /// Fails pending and future creations with [`PipelineError::Stopped`].
    pub fn shutdown(&self) {
        let pending = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.stopped.store(true, Ordering::SeqCst);
            std::mem::take(&mut *pending)
        };
        if !pending.is_empty() {
            debug!("dropping {} pending entity creations", pending.len());
        }
    }
}

/// Feeds an entity's messages to its model, one at a time.
async fn replay(
    entity: Entity,
    mut input: mpsc::UnboundedReceiver<ModelMessage>,
    manager_updated: Observers<Entity>,
) {
    while let Some(message) = input.recv().await {
        let result = entity
            .inner
            .model
            .write()
            .await
            .process_message(&message)
            .await;

        let meta = &message.meta;
        entity.inner.replay.send_modify(|state| {
            state.observed = state
                .observed
                .with_feed(&meta.feed_key, meta.seq.saturating_add(1));
        });

        match result {
            Ok(()) => {
                entity.inner.updated.notify(&entity);
                manager_updated.notify(&entity);
            }
            Err(e) => warn!(
                "entity {} skipped message {}: {e}",
                entity.id(),
                meta.position()
            ),
        }
    }
    entity.inner.replay.send_modify(|state| state.ended = true);
    debug!("replay ended for entity {}", entity.id());
}
