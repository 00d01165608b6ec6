//! # Seed Membership Store
//!
//! The authoritative mapping from `PeerId` to `PeerEntry`, held by every
//! seed. The only mutation paths are [`MembershipSet::insert`] and
//! [`MembershipSet::remove`] — both are invoked exclusively from an
//! `approved` consensus decision (§4.3) or from a seed-sync merge (§4.4),
//! never directly from a client request.
//!
//! `contains`/`insert`/`remove`/`snapshot` are atomic with respect to each
//! other: the whole map sits behind one `parking_lot::Mutex` — reads are
//! cheap, writes are rare and already serialized by the consensus engine,
//! so a single lock is simpler than sharding without being a contention
//! hazard.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered peer's connection endpoint and join time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub host: String,
    pub port: u16,
    /// Unix epoch seconds at which the register decision was approved.
    pub joined_at: f64,
}

/// The authoritative peer map held by one seed.
#[derive(Default)]
pub struct MembershipSet {
    peers: Mutex<HashMap<String, PeerEntry>>,
}

impl MembershipSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.lock().contains_key(peer_id)
    }

    /// Inserts `entry` under `peer_id`. A peer already present is left
    /// untouched — insertion is idempotent, not an error (`MembershipConflict`
    /// is a policy outcome, not a surfaced failure; see §7).
    pub fn insert(&self, peer_id: String, entry: PeerEntry) {
        self.peers.lock().entry(peer_id).or_insert(entry);
    }

    /// Removes `peer_id`, returning its prior entry, or `None` if it was
    /// already absent (also idempotent).
    pub fn remove(&self, peer_id: &str) -> Option<PeerEntry> {
        self.peers.lock().remove(peer_id)
    }

    /// A point-in-time copy of the full membership, used to answer
    /// `GET_PEER_LIST` and to build `SEED_SYNC` payloads.
    pub fn snapshot(&self) -> HashMap<String, PeerEntry> {
        self.peers.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Merges previously-unknown peers from a remote snapshot (§4.4). Never
    /// removes — deletions only ever happen through consensus. Returns the
    /// ids that were newly merged, for logging.
    pub fn merge(&self, remote: &HashMap<String, PeerEntry>) -> Vec<String> {
        let mut peers = self.peers.lock();
        let mut merged = Vec::new();
        for (id, entry) in remote {
            if !peers.contains_key(id) {
                peers.insert(id.clone(), entry.clone());
                merged.push(id.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> PeerEntry {
        PeerEntry { host: "127.0.0.1".into(), port: 7000, joined_at: 0.0 }
    }

    #[test]
    fn insert_then_insert_is_a_single_insert() {
        let set = MembershipSet::new();
        set.insert("127.0.0.1:7000".into(), entry());
        let mut other = entry();
        other.port = 9999;
        set.insert("127.0.0.1:7000".into(), other);
        assert_eq!(set.len(), 1);
        assert_eq!(set.snapshot()["127.0.0.1:7000"].port, 7000);
    }

    #[test]
    fn remove_absent_is_a_noop() {
        let set = MembershipSet::new();
        assert_eq!(set.remove("ghost:1"), None);
    }

    #[test]
    fn remove_present_returns_prior_entry() {
        let set = MembershipSet::new();
        set.insert("127.0.0.1:7000".into(), entry());
        assert_eq!(set.remove("127.0.0.1:7000"), Some(entry()));
        assert!(!set.contains("127.0.0.1:7000"));
    }

    #[test]
    fn merge_never_deletes_and_skips_known_ids() {
        let set = MembershipSet::new();
        set.insert("a:1".into(), entry());
        let mut remote = HashMap::new();
        remote.insert("a:1".into(), PeerEntry { port: 9999, ..entry() });
        remote.insert("b:2".into(), entry());
        let merged = set.merge(&remote);
        assert_eq!(merged, vec!["b:2".to_string()]);
        assert_eq!(set.snapshot()["a:1"].port, entry().port);
    }
}
