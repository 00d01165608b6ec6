//! # Gossip Dissemination
//!
//! Each peer may originate up to [`crate::config::MAX_GOSSIP_MESSAGES`]
//! messages over its lifetime. A generated or received message is recorded
//! by its hash exactly once and forwarded to every current neighbor except
//! the one it arrived from — there is no TTL, only hash-based
//! deduplication, so flooding terminates because every peer has already
//! seen the hash by the time it would be re-forwarded back to it.

use sha2::{Digest, Sha256};

/// Builds the message id string in the wire format `<timestamp>:<host>:<port>:<msg_num>`.
pub fn message_id(timestamp: f64, host: &str, port: u16, msg_num: u32) -> String {
    format!("{timestamp}:{host}:{port}:{msg_num}")
}

/// SHA-256 hex digest of a message id, used as the deduplication key.
pub fn hash_message(msg_id: &str) -> String {
    let digest = Sha256::digest(msg_id.as_bytes());
    hex::encode(digest)
}

/// A locally recorded gossip message: either one this peer originated, or
/// one received from a neighbor.
#[derive(Debug, Clone, PartialEq)]
pub struct GossipRecord {
    pub msg_id: String,
    pub timestamp: f64,
    /// `Some(originating peer's PeerId)` only for messages this peer
    /// originated; received messages carry no recorded origin, matching
    /// the reference peer's `message_list` entries.
    pub origin: Option<String>,
    /// The neighbor a received message arrived from; `None` for messages
    /// this peer originated.
    pub received_from: Option<String>,
}

/// The append-only, hash-keyed log of every gossip message this peer has
/// seen, originated or not. Bounds the total number of messages this peer
/// will ever *originate* (`MAX_GOSSIP_MESSAGES`), but never bounds how many
/// it may relay for others.
#[derive(Default)]
pub struct GossipStore {
    seen: parking_lot::Mutex<std::collections::HashMap<String, GossipRecord>>,
    originated: std::sync::atomic::AtomicU32,
}

impl GossipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn originated_count(&self) -> u32 {
        self.originated.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Claims the next message number for a new origination, or `None` if
    /// the per-peer cap has already been reached.
    pub fn try_claim_next(&self, max_messages: u32) -> Option<u32> {
        loop {
            let current = self.originated.load(std::sync::atomic::Ordering::SeqCst);
            if current >= max_messages {
                return None;
            }
            if self
                .originated
                .compare_exchange(
                    current,
                    current + 1,
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                )
                .is_ok()
            {
                return Some(current + 1);
            }
        }
    }

    /// Records a message this peer itself originated.
    pub fn record_originated(&self, msg_id: String, msg_hash: String, timestamp: f64, origin: String) {
        self.seen.lock().insert(
            msg_hash,
            GossipRecord { msg_id, timestamp, origin: Some(origin), received_from: None },
        );
    }

    /// Records an incoming message if its hash hasn't been seen before.
    /// Returns `true` if this was the first time (caller should log and
    /// forward), `false` if it's a duplicate (caller should silently drop).
    pub fn record_received(
        &self,
        msg_id: String,
        msg_hash: String,
        timestamp: f64,
        received_from: String,
    ) -> bool {
        use std::collections::hash_map::Entry;
        let mut seen = self.seen.lock();
        match seen.entry(msg_hash) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(GossipRecord {
                    msg_id,
                    timestamp,
                    origin: None,
                    received_from: Some(received_from),
                });
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_matches_wire_format() {
        assert_eq!(message_id(1.0, "127.0.0.1", 7000, 3), "1:127.0.0.1:7000:3");
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        let h1 = hash_message("1.0:127.0.0.1:7000:1");
        let h2 = hash_message("1.0:127.0.0.1:7000:1");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_messages_hash_differently() {
        assert_ne!(hash_message("a"), hash_message("b"));
    }

    #[test]
    fn claim_next_enforces_the_cap() {
        let store = GossipStore::new();
        assert_eq!(store.try_claim_next(2), Some(1));
        assert_eq!(store.try_claim_next(2), Some(2));
        assert_eq!(store.try_claim_next(2), None);
    }

    #[test]
    fn duplicate_hash_is_recognized_and_rejected() {
        let store = GossipStore::new();
        assert!(store.record_received("m1".into(), "h1".into(), 1.0, "a:1".into()));
        assert!(!store.record_received("m1".into(), "h1".into(), 2.0, "b:2".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn originated_and_received_are_both_tracked_in_the_same_store() {
        let store = GossipStore::new();
        store.record_originated("m1".into(), "h1".into(), 1.0, "a:1".into());
        assert!(!store.record_received("m1".into(), "h1".into(), 1.0, "b:2".into()));
        assert_eq!(store.len(), 1);
    }
}
