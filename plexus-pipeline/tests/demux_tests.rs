use plexus_model::{Envelope, ModelFactory, ModelType, ObjectModel, Payload};
use plexus_pipeline::{
    AdmissionSet, CustomMessage, Demultiplexer, EntityManager, FeedBlock, PipelineError,
};
use plexus_types::{EntityId, FeedKey, FeedPosition};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn key(byte: u8) -> FeedKey {
    FeedKey::from_bytes(vec![byte])
}

fn make_demux() -> (Demultiplexer, Arc<EntityManager>, AdmissionSet) {
    let factory = ModelFactory::new();
    factory.register::<ObjectModel>().unwrap();
    let manager = Arc::new(EntityManager::new(Arc::new(factory), None));
    let admission = AdmissionSet::new();
    let demux = Demultiplexer::new(Arc::clone(&manager), admission.clone());
    (demux, manager, admission)
}

fn block(seq: u64, envelope: Envelope) -> FeedBlock<Envelope> {
    FeedBlock::new(key(1), seq, envelope)
}

fn set(id: EntityId, property: &str, value: Value) -> Envelope {
    Envelope::mutation(id, json!({"op": "set", "key": property, "value": value}))
}

async fn property(manager: &EntityManager, id: EntityId, property: &str) -> Option<Value> {
    let entity = manager.get_entity(&id)?;
    entity
        .with_model::<ObjectModel, _>(|m| m.get(property).cloned())
        .await
        .flatten()
}

// ── Control ──────────────────────────────────────────────────────

#[tokio::test]
async fn control_messages_update_admission() {
    let (mut demux, _, admission) = make_demux();

    demux.process(block(0, Envelope::admit(key(2)))).unwrap();
    assert!(admission.contains(&key(2)));

    demux.process(block(1, Envelope::remove(key(2)))).unwrap();
    assert!(!admission.contains(&key(2)));
}

#[tokio::test]
async fn custom_messages_reach_observers() {
    let (mut demux, manager, _) = make_demux();
    let seen: Arc<Mutex<Vec<CustomMessage>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let _sub = demux.on_custom_message(move |message| {
        sink.lock().unwrap().push(message.clone());
    });

    demux
        .process(block(3, Envelope::custom("ping", json!({"n": 1}))))
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].tag, "ping");
    assert_eq!(seen[0].data, json!({"n": 1}));
    assert_eq!(seen[0].meta.position(), FeedPosition::new(key(1), 3));
    assert!(manager.is_empty());
}

// ── Entities ─────────────────────────────────────────────────────

#[tokio::test]
async fn genesis_then_mutations_are_replayed() {
    let (mut demux, manager, _) = make_demux();
    let id = EntityId::new();

    demux
        .process(block(0, Envelope::genesis(id, "task", ObjectModel::KIND)))
        .unwrap();
    demux.process(block(1, set(id, "title", json!("a")))).unwrap();
    demux.process(block(2, set(id, "title", json!("b")))).unwrap();

    let entity = manager.get_entity(&id).unwrap();
    entity
        .wait_for(&FeedPosition::new(key(1), 2))
        .await
        .unwrap();
    assert_eq!(property(&manager, id, "title").await, Some(json!("b")));
}

#[tokio::test]
async fn mutations_before_genesis_are_buffered() {
    let (mut demux, manager, _) = make_demux();
    let id = EntityId::new();

    demux.process(block(0, set(id, "title", json!("early")))).unwrap();
    assert!(manager.get_entity(&id).is_none());

    demux
        .process(block(1, Envelope::genesis(id, "task", ObjectModel::KIND)))
        .unwrap();
    let entity = manager.get_entity(&id).unwrap();
    entity
        .wait_for(&FeedPosition::new(key(1), 0))
        .await
        .unwrap();
    assert_eq!(property(&manager, id, "title").await, Some(json!("early")));
}

#[tokio::test]
async fn initial_mutation_is_replayed_first() {
    let (mut demux, manager, _) = make_demux();
    let id = EntityId::new();

    demux.process(block(0, set(id, "title", json!("later")))).unwrap();
    let genesis = Envelope::new(Payload::Genesis {
        entity_id: id,
        entity_type: "task".into(),
        model_kind: ObjectModel::KIND.into(),
        parent_id: None,
        mutation: Some(json!({"op": "set", "key": "title", "value": "initial"})),
    });
    demux.process(block(1, genesis)).unwrap();

    let entity = manager.get_entity(&id).unwrap();
    entity
        .wait_for(&FeedPosition::new(key(1), 1))
        .await
        .unwrap();
    entity
        .wait_for(&FeedPosition::new(key(1), 0))
        .await
        .unwrap();
    assert_eq!(property(&manager, id, "title").await, Some(json!("later")));
}

#[tokio::test]
async fn entities_are_isolated() {
    let (mut demux, manager, _) = make_demux();
    let a = EntityId::new();
    let b = EntityId::new();

    demux
        .process(block(0, Envelope::genesis(a, "task", ObjectModel::KIND)))
        .unwrap();
    demux
        .process(block(1, Envelope::genesis(b, "task", ObjectModel::KIND)))
        .unwrap();
    demux.process(block(2, set(a, "title", json!("for a")))).unwrap();
    demux.process(block(3, set(b, "title", json!("for b")))).unwrap();

    manager
        .get_entity(&b)
        .unwrap()
        .wait_for(&FeedPosition::new(key(1), 3))
        .await
        .unwrap();
    manager
        .get_entity(&a)
        .unwrap()
        .wait_for(&FeedPosition::new(key(1), 2))
        .await
        .unwrap();
    assert_eq!(property(&manager, a, "title").await, Some(json!("for a")));
    assert_eq!(property(&manager, b, "title").await, Some(json!("for b")));
}

#[tokio::test]
async fn unknown_model_does_not_break_other_entities() {
    let (mut demux, manager, _) = make_demux();
    let broken = EntityId::new();
    let fine = EntityId::new();

    demux
        .process(block(0, Envelope::genesis(broken, "task", "unregistered")))
        .unwrap();
    demux
        .process(block(1, set(broken, "title", json!("lost"))))
        .unwrap();
    demux
        .process(block(2, Envelope::genesis(fine, "task", ObjectModel::KIND)))
        .unwrap();
    demux.process(block(3, set(fine, "title", json!("kept")))).unwrap();

    assert!(manager.get_entity(&broken).is_none());
    manager
        .get_entity(&fine)
        .unwrap()
        .wait_for(&FeedPosition::new(key(1), 3))
        .await
        .unwrap();
    assert_eq!(property(&manager, fine, "title").await, Some(json!("kept")));
}

// ── Protocol violations ──────────────────────────────────────────

#[tokio::test]
async fn nil_entity_id_is_rejected() {
    let (mut demux, _, _) = make_demux();

    let err = demux
        .process(block(0, set(EntityId::nil(), "x", json!(1))))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProtocolViolation(_)));

    let err = demux
        .process(block(
            1,
            Envelope::genesis(EntityId::nil(), "task", ObjectModel::KIND),
        ))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProtocolViolation(_)));
}

#[tokio::test]
async fn second_genesis_is_rejected() {
    let (mut demux, manager, _) = make_demux();
    let id = EntityId::new();
    demux
        .process(block(0, Envelope::genesis(id, "task", ObjectModel::KIND)))
        .unwrap();

    let err = demux
        .process(block(1, Envelope::genesis(id, "note", ObjectModel::KIND)))
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProtocolViolation(_)));
    assert_eq!(manager.get_entity(&id).unwrap().entity_type(), "task");
}
