use plexus_clock::CausalClock;
use plexus_model::Envelope;
use plexus_pipeline::{FeedBlock, tie_break};
use plexus_types::FeedKey;
use serde_json::json;

fn key(byte: u8) -> FeedKey {
    FeedKey::from_bytes(vec![byte])
}

fn block(feed: u8, data: u32) -> FeedBlock<u32> {
    FeedBlock::new(key(feed), 0, data)
}

fn envelope_block(feed: u8, timestamp: Option<CausalClock>) -> FeedBlock<Envelope> {
    let mut envelope = Envelope::custom("t", json!(null));
    envelope.timestamp = timestamp;
    FeedBlock::new(key(feed), 0, envelope)
}

#[test]
fn first_always_picks_index_zero() {
    let mut policy = tie_break::first();
    let (a, b) = (block(1, 0), block(2, 0));
    assert_eq!(policy(&[&a, &b]), Some(0));
    assert_eq!(policy(&[&b]), Some(0));
    assert_eq!(policy(&[]), None);
}

#[test]
fn round_robin_rotates() {
    let mut policy = tie_break::round_robin();
    let (a, b, c) = (block(1, 0), block(2, 0), block(3, 0));
    let picks: Vec<_> = (0..4).map(|_| policy(&[&a, &b, &c]).unwrap()).collect();
    assert_eq!(picks, vec![0, 1, 2, 0]);
}

#[test]
fn priority_prefers_listed_feeds() {
    let mut policy = tie_break::by_feed_priority(vec![key(3), key(1)]);
    let (a, b, c) = (block(1, 0), block(2, 0), block(3, 0));

    assert_eq!(policy(&[&a, &b, &c]), Some(2));
    assert_eq!(policy(&[&a, &b]), Some(0));
    // Unlisted feeds fall back to tracking order.
    assert_eq!(policy(&[&b, &block(4, 0)]), Some(0));
}

#[test]
fn causal_puts_untimestamped_first() {
    let mut policy = tie_break::causal();
    let stamped = envelope_block(1, Some(CausalClock::zero().with_feed(&key(1), 1)));
    let bare = envelope_block(2, None);
    assert_eq!(policy(&[&stamped, &bare]), Some(1));
}

#[test]
fn causal_picks_happened_before() {
    let mut policy = tie_break::causal();
    let early = CausalClock::zero().with_feed(&key(1), 1);
    let late = early.with_feed(&key(2), 3);
    let a = envelope_block(1, Some(late));
    let b = envelope_block(2, Some(early));
    assert_eq!(policy(&[&a, &b]), Some(1));
}

#[test]
fn causal_breaks_concurrent_ties_deterministically() {
    let x = CausalClock::zero().with_feed(&key(1), 1);
    let y = CausalClock::zero().with_feed(&key(2), 1);
    let a = envelope_block(1, Some(x));
    let b = envelope_block(2, Some(y));

    let forward = tie_break::causal()(&[&a, &b]).unwrap();
    let backward = tie_break::causal()(&[&b, &a]).unwrap();

    // Same message wins regardless of candidate order.
    let winner = [&a, &b][forward].feed_key.clone();
    assert_eq!([&b, &a][backward].feed_key, winner);
    // The numerically smaller node id sorts after: y's node is larger.
    assert_eq!(winner, key(2));
}
