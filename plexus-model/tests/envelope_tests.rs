use plexus_clock::CausalClock;
use plexus_model::{Envelope, MessageMeta, ModelKind, ModelMessage, ObjectMutation, Payload};
use plexus_types::{EntityId, FeedKey, FeedPosition};
use pretty_assertions::assert_eq;
use serde_json::json;

fn key(byte: u8) -> FeedKey {
    FeedKey::from_bytes(vec![byte])
}

// ── Payload ──────────────────────────────────────────────────────

#[test]
fn control_payloads_have_no_entity() {
    let admit = Envelope::admit(key(1));
    let remove = Envelope::remove(key(1));
    assert!(admit.payload.is_control());
    assert!(remove.payload.is_control());
    assert_eq!(admit.payload.entity_id(), None);
    assert_eq!(remove.payload.kind(), "remove");
}

#[test]
fn entity_payloads_carry_entity_id() {
    let id = EntityId::new();
    let genesis = Envelope::genesis(id, "task", "plexus:model/object");
    let mutation = Envelope::mutation(id, json!({"op": "unset", "key": "a"}));
    assert_eq!(genesis.payload.entity_id(), Some(id));
    assert_eq!(mutation.payload.entity_id(), Some(id));
    assert!(!genesis.payload.is_control());
}

#[test]
fn custom_payload_is_neither_control_nor_entity() {
    let custom = Envelope::custom("ping", json!({"n": 1}));
    assert!(!custom.payload.is_control());
    assert_eq!(custom.payload.entity_id(), None);
    assert_eq!(custom.payload.kind(), "custom");
}

// ── Encoding ─────────────────────────────────────────────────────

#[test]
fn admit_wire_form() {
    let json = serde_json::to_value(Envelope::admit(key(0xab))).unwrap();
    assert_eq!(json, json!({"payload": {"kind": "admit", "feed_key": "ab"}}));
}

#[test]
fn genesis_roundtrip_with_optional_fields() {
    let id = EntityId::new();
    let parent = EntityId::new();
    let envelope = Envelope::new(Payload::Genesis {
        entity_id: id,
        entity_type: "task".into(),
        model_kind: ModelKind::from("plexus:model/object"),
        parent_id: Some(parent),
        mutation: Some(json!({"op": "set", "key": "title", "value": "x"})),
    })
    .with_timestamp(CausalClock::zero().with_feed(&key(1), 2));

    let bytes = envelope.encode().unwrap();
    let decoded = Envelope::decode(&bytes).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn genesis_without_optional_fields_decodes() {
    let id = EntityId::new();
    let raw = json!({
        "payload": {
            "kind": "genesis",
            "entity_id": id.to_string(),
            "entity_type": "task",
            "model_kind": "m"
        }
    });
    let envelope: Envelope = serde_json::from_value(raw).unwrap();
    assert_eq!(envelope, Envelope::genesis(id, "task", "m"));
    assert!(envelope.timestamp.is_none());
}

#[test]
fn unknown_kind_is_rejected() {
    let raw = br#"{"payload": {"kind": "teleport", "entity_id": "x"}}"#;
    assert!(Envelope::decode(raw).is_err());
}

#[test]
fn entity_message_without_entity_id_is_rejected() {
    let raw = br#"{"payload": {"kind": "mutation", "mutation": {}}}"#;
    assert!(Envelope::decode(raw).is_err());
}

// ── ModelMessage ─────────────────────────────────────────────────

#[test]
fn model_message_decodes_typed_mutation() {
    let message = ModelMessage {
        meta: MessageMeta {
            feed_key: key(3),
            seq: 7,
            timestamp: None,
        },
        mutation: json!({"op": "set", "key": "k", "value": 1}),
    };
    let decoded: ObjectMutation = message.decode().unwrap();
    assert_eq!(
        decoded,
        ObjectMutation::Set {
            key: "k".into(),
            value: json!(1)
        }
    );
    assert_eq!(message.meta.position(), FeedPosition::new(key(3), 7));
}

#[test]
fn model_message_decode_error() {
    let message = ModelMessage {
        meta: MessageMeta {
            feed_key: key(3),
            seq: 0,
            timestamp: None,
        },
        mutation: json!({"op": "explode"}),
    };
    assert!(message.decode::<ObjectMutation>().is_err());
}
