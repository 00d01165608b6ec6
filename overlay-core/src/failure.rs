//! # Peer-Level Failure Detection
//!
//! The peer half of the two-level detector (the seed half is the removal
//! arm of [`crate::consensus`]). Every neighbor gets pinged on
//! [`crate::config::PING_INTERVAL`]; a ping with no matching `PONG` bumps a
//! miss counter, and once that counter crosses [`crate::config::SUSPICION_THRESHOLD`]
//! the neighbor becomes a suspect. A suspect triggers a *peer-level*
//! consensus round — this peer queries its other neighbors with
//! `SUSPECT_QUERY` and only escalates to the seeds with a `DEAD_NODE_REPORT`
//! once a majority of queried neighbors corroborate (`confirm >= total/2+1`,
//! counting the asking peer itself as one confirming vote).
//!
//! Ping misses are deliberately not logged (matching the reference
//! detector) — only state transitions into and out of suspicion are.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::identity::parse_peer_id;

/// Builds the dead-node report string in the wire-mandated format
/// `Dead Node:<ip>:<port>:<timestamp>:<reporter ip>`.
pub fn dead_node_message(dead_host: &str, dead_port: u16, timestamp: f64, reporter_host: &str) -> String {
    format!("Dead Node:{dead_host}:{dead_port}:{timestamp}:{reporter_host}")
}

/// Builds the report string for a dead peer id, splitting host/port first.
/// Returns `None` if `dead_id` isn't a well-formed `PeerId`.
pub fn dead_node_message_for(dead_id: &str, timestamp: f64, reporter_host: &str) -> Option<String> {
    let (host, port) = parse_peer_id(dead_id)?;
    Some(dead_node_message(&host, port, timestamp, reporter_host))
}

/// Per-neighbor ping-miss bookkeeping and the set of neighbors currently
/// under active peer-level consensus.
#[derive(Default)]
pub struct SuspicionTracker {
    miss_counts: Mutex<HashMap<String, u32>>,
    suspected: Mutex<HashSet<String>>,
}

impl SuspicionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears a neighbor's miss count and suspected flag after a fresh PONG.
    pub fn record_pong(&self, peer_id: &str) {
        self.miss_counts.lock().remove(peer_id);
        self.suspected.lock().remove(peer_id);
    }

    /// Bumps a neighbor's miss count after an unanswered ping.
    pub fn record_miss(&self, peer_id: &str) -> u32 {
        let mut counts = self.miss_counts.lock();
        let count = counts.entry(peer_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn miss_count(&self, peer_id: &str) -> u32 {
        *self.miss_counts.lock().get(peer_id).unwrap_or(&0)
    }

    /// Returns neighbors whose miss count has crossed `threshold` and are
    /// not already under an active consensus round, marking them suspected
    /// as a side effect (matching the reference detector, which flags a
    /// suspect the moment it's picked up for querying, before the round
    /// concludes).
    pub fn take_new_suspects(&self, threshold: u32) -> Vec<String> {
        let over_threshold: Vec<String> = self
            .miss_counts
            .lock()
            .iter()
            .filter(|(_, &count)| count >= threshold)
            .map(|(id, _)| id.clone())
            .collect();

        let mut suspected = self.suspected.lock();
        let mut fresh = Vec::new();
        for id in over_threshold {
            if suspected.insert(id.clone()) {
                fresh.push(id);
            }
        }
        fresh
    }

    /// Whether this peer has at least one miss recorded against `peer_id`,
    /// the condition the reference detector uses to answer a `SUSPECT_QUERY`
    /// without needing a live probe.
    pub fn has_any_miss(&self, peer_id: &str) -> bool {
        self.miss_count(peer_id) >= 1
    }

    /// Cancels a suspicion round that failed to reach peer-level consensus,
    /// resetting the neighbor back to a clean slate.
    pub fn cancel_suspicion(&self, peer_id: &str) {
        self.suspected.lock().remove(peer_id);
        self.miss_counts.lock().remove(peer_id);
    }
}

/// Tallies a peer-level consensus round over one suspect. The asking peer
/// always counts itself as a confirming vote; `quorum = total / 2 + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerConsensusResult {
    pub confirm: usize,
    pub total: usize,
    pub quorum: usize,
}

impl PeerConsensusResult {
    pub fn confirmed(&self) -> bool {
        self.confirm >= self.quorum
    }
}

/// Computes the peer-level consensus outcome given how many of `total`
/// queried neighbors (including self) confirmed the suspect dead.
pub fn decide_peer_consensus(confirm: usize, total: usize) -> PeerConsensusResult {
    let quorum = total / 2 + 1;
    PeerConsensusResult { confirm, total, quorum }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_node_message_matches_wire_format() {
        let msg = dead_node_message("127.0.0.1", 7001, 123.5, "127.0.0.1");
        assert_eq!(msg, "Dead Node:127.0.0.1:7001:123.5:127.0.0.1");
    }

    #[test]
    fn dead_node_message_for_splits_peer_id() {
        let msg = dead_node_message_for("127.0.0.1:7001", 1.0, "127.0.0.1").unwrap();
        assert_eq!(msg, "Dead Node:127.0.0.1:7001:1:127.0.0.1");
        assert!(dead_node_message_for("malformed", 1.0, "x").is_none());
    }

    #[test]
    fn record_pong_clears_misses_and_suspicion() {
        let tracker = SuspicionTracker::new();
        tracker.record_miss("p:1");
        tracker.record_miss("p:1");
        tracker.take_new_suspects(2);
        tracker.record_pong("p:1");
        assert_eq!(tracker.miss_count("p:1"), 0);
        assert_eq!(tracker.take_new_suspects(0), Vec::<String>::new());
    }

    #[test]
    fn take_new_suspects_only_returns_each_suspect_once() {
        let tracker = SuspicionTracker::new();
        tracker.record_miss("p:1");
        tracker.record_miss("p:1");
        tracker.record_miss("p:1");
        assert_eq!(tracker.take_new_suspects(3), vec!["p:1".to_string()]);
        assert!(tracker.take_new_suspects(3).is_empty());
    }

    #[test]
    fn cancel_suspicion_resets_to_clean_slate() {
        let tracker = SuspicionTracker::new();
        tracker.record_miss("p:1");
        tracker.record_miss("p:1");
        tracker.record_miss("p:1");
        tracker.take_new_suspects(3);
        tracker.cancel_suspicion("p:1");
        assert_eq!(tracker.miss_count("p:1"), 0);
        assert_eq!(tracker.take_new_suspects(3), Vec::<String>::new());
    }

    #[test]
    fn peer_consensus_quorum_matches_seed_quorum_arithmetic() {
        assert!(decide_peer_consensus(2, 3).confirmed());
        assert!(!decide_peer_consensus(1, 3).confirmed());
        assert!(decide_peer_consensus(1, 1).confirmed());
    }
}
