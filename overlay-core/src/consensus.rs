//! # Seed Quorum Consensus
//!
//! The only path by which a seed's [`MembershipSet`](crate::membership::MembershipSet)
//! may change. A register or remove proposal is created by one seed (the
//! "proposer"), broadcast to every other seed, self-voted YES, and decided
//! once enough votes are in — either because a quorum was reached early, or
//! because every seed has weighed in and no further votes can arrive.
//!
//! ## Quorum
//!
//! `quorum = total_seeds / 2 + 1`. A proposal is **approved** once `yes >=
//! quorum`. If every seed has voted and quorum was not reached, normal
//! arithmetic rejects the proposal outright — but see [`DegradedMode`] for
//! what happens when some seeds never answer at all (can't distinguish "no
//! vote yet" from "unreachable" without a full round-trip timeout).
//!
//! ## Degraded mode
//!
//! A proposal round has a bounded collection window (`VOTE_COLLECTION_TIMEOUT`,
//! see [`crate::config`]); seeds that don't answer in time are simply absent
//! from the vote tally when the caller calls [`ConsensusEngine::decide`]. If
//! the network is partitioned badly enough that quorum is unreachable even
//! after the window closes, [`DegradedMode`] governs the fallback:
//!
//! - [`DegradedMode::Strict`] — never approve without a real quorum; an
//!   under-voted proposal is rejected.
//! - [`DegradedMode::Permissive`] (default) — accept on any YES vote at all
//!   once quorum is unreachable, favoring availability over a livelocked
//!   minority partition. This is what the reference implementation does.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::RngCore;
use uuid::Uuid;

/// What to do when every reachable seed has voted but quorum was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegradedMode {
    /// Require a real quorum; reject otherwise.
    Strict,
    /// Accept on any YES vote once quorum is structurally unreachable.
    #[default]
    Permissive,
}

/// Which kind of membership change a proposal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    Register,
    Remove,
}

/// Register-specific fields. Present only on `Register` proposals.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterDetails {
    pub peer_host: String,
    pub peer_port: u16,
}

/// Remove-specific fields. Present only on `Remove` proposals.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveDetails {
    pub reporter: String,
    pub peer_votes: u32,
}

/// One in-flight or decided membership proposal.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: String,
    pub kind: ProposalKind,
    pub peer_id: String,
    pub proposer: String,
    pub register: Option<RegisterDetails>,
    pub remove: Option<RemoveDetails>,
    pub votes: HashMap<String, bool>,
    pub decided: bool,
    pub created_at: f64,
}

impl Proposal {
    pub fn yes_votes(&self) -> usize {
        self.votes.values().filter(|v| **v).count()
    }
}

/// The outcome of deciding a proposal: whether it's approved, plus the
/// tallies a log line needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,
    pub yes: usize,
    pub total: usize,
}

/// Generates an 8-hex-character proposal id, matching `str(uuid.uuid4())[:8]`
/// in the system this protocol was modeled on.
pub fn new_proposal_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Tracks all proposals known to one seed and decides them against its
/// quorum. Holds no membership state itself — callers apply an `approved`
/// [`Decision`] to their [`MembershipSet`](crate::membership::MembershipSet).
pub struct ConsensusEngine {
    my_id: String,
    total_seeds: usize,
    quorum: usize,
    degraded_mode: DegradedMode,
    proposals: Mutex<HashMap<String, Proposal>>,
}

impl ConsensusEngine {
    pub fn new(my_id: String, total_seeds: usize) -> Self {
        Self::with_degraded_mode(my_id, total_seeds, DegradedMode::default())
    }

    pub fn with_degraded_mode(my_id: String, total_seeds: usize, degraded_mode: DegradedMode) -> Self {
        let quorum = total_seeds / 2 + 1;
        Self {
            my_id,
            total_seeds,
            quorum,
            degraded_mode,
            proposals: Mutex::new(HashMap::new()),
        }
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn total_seeds(&self) -> usize {
        self.total_seeds
    }

    /// Starts a new register proposal, self-voted YES, owned by this seed.
    pub fn propose_register(&self, peer_id: String, host: String, port: u16) -> Proposal {
        let proposal = Proposal {
            id: new_proposal_id(),
            kind: ProposalKind::Register,
            peer_id,
            proposer: self.my_id.clone(),
            register: Some(RegisterDetails { peer_host: host, peer_port: port }),
            remove: None,
            votes: HashMap::from([(self.my_id.clone(), true)]),
            decided: false,
            created_at: now(),
        };
        self.proposals.lock().insert(proposal.id.clone(), proposal.clone());
        proposal
    }

    /// Starts a new removal proposal, self-voted YES.
    pub fn propose_remove(&self, peer_id: String, reporter: String, peer_votes: u32) -> Proposal {
        let proposal = Proposal {
            id: new_proposal_id(),
            kind: ProposalKind::Remove,
            peer_id,
            proposer: self.my_id.clone(),
            register: None,
            remove: Some(RemoveDetails { reporter, peer_votes }),
            votes: HashMap::from([(self.my_id.clone(), true)]),
            decided: false,
            created_at: now(),
        };
        self.proposals.lock().insert(proposal.id.clone(), proposal.clone());
        proposal
    }

    /// Records an incoming register proposal from a remote seed and decides
    /// this seed's own vote on it: YES unless local policy objects (there is
    /// none for register — an already-known peer votes YES too, idempotently).
    pub fn receive_register_proposal(
        &self,
        id: &str,
        peer_id: String,
        host: String,
        port: u16,
        proposer: String,
    ) -> bool {
        let vote = true;
        let mut proposals = self.proposals.lock();
        proposals.entry(id.to_string()).or_insert_with(|| Proposal {
            id: id.to_string(),
            kind: ProposalKind::Register,
            peer_id,
            proposer,
            register: Some(RegisterDetails { peer_host: host, peer_port: port }),
            remove: None,
            votes: HashMap::from([(self.my_id.clone(), vote)]),
            decided: false,
            created_at: now(),
        });
        vote
    }

    /// Records an incoming removal proposal from a remote seed and decides
    /// this seed's vote: NO if the peer isn't in `known_member`, YES otherwise.
    pub fn receive_remove_proposal(
        &self,
        id: &str,
        peer_id: String,
        reporter: String,
        peer_votes: u32,
        proposer: String,
        known_member: bool,
    ) -> bool {
        let vote = known_member;
        let mut proposals = self.proposals.lock();
        proposals.entry(id.to_string()).or_insert_with(|| Proposal {
            id: id.to_string(),
            kind: ProposalKind::Remove,
            peer_id,
            proposer,
            register: None,
            remove: Some(RemoveDetails { reporter, peer_votes }),
            votes: HashMap::from([(self.my_id.clone(), vote)]),
            decided: false,
            created_at: now(),
        });
        vote
    }

    /// Records a vote from a remote seed on a proposal this seed is tracking.
    /// A vote for an unknown proposal id is dropped (the proposal may already
    /// have been GC'd, or may never have been seen — both are harmless).
    pub fn record_vote(&self, proposal_id: &str, voter: String, vote: bool) {
        if let Some(p) = self.proposals.lock().get_mut(proposal_id) {
            p.votes.insert(voter, vote);
        }
    }

    /// Decides a proposal against the current vote tally. Returns `None` if
    /// the proposal is unknown or was already decided (repeat decisions are
    /// a no-op, not an error).
    pub fn decide(&self, proposal_id: &str) -> Option<(Proposal, Decision)> {
        let mut proposals = self.proposals.lock();
        let prop = proposals.get_mut(proposal_id)?;
        if prop.decided {
            return None;
        }
        let yes = prop.yes_votes();
        let total = prop.votes.len();

        let approved = if yes >= self.quorum {
            true
        } else if total >= self.total_seeds {
            false
        } else {
            match self.degraded_mode {
                DegradedMode::Strict => false,
                DegradedMode::Permissive => yes >= self.quorum || yes >= 1,
            }
        };
        prop.decided = true;
        Some((prop.clone(), Decision { approved, yes, total }))
    }

    /// Returns the proposal for a given id, if still tracked.
    pub fn get(&self, proposal_id: &str) -> Option<Proposal> {
        self.proposals.lock().get(proposal_id).cloned()
    }

    /// Drops decided proposals older than `max_age_secs`. Called from the
    /// seed's periodic sync tick; undecided proposals are never swept so a
    /// slow vote round can't be cut short by GC.
    pub fn sweep_decided(&self, max_age_secs: f64) -> usize {
        let cutoff = now() - max_age_secs;
        let mut proposals = self.proposals.lock();
        let before = proposals.len();
        proposals.retain(|_, p| !(p.decided && p.created_at < cutoff));
        before - proposals.len()
    }
}

/// Draws a random delay jitter in `[0, max_ms)`, used when staggering
/// outbound proposal fanout so seeds don't all hammer each other in lockstep.
pub fn jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().next_u64() % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(total_seeds: usize) -> ConsensusEngine {
        ConsensusEngine::new("seed-a".into(), total_seeds)
    }

    #[test]
    fn quorum_is_floor_n_over_2_plus_1() {
        assert_eq!(engine(1).quorum(), 1);
        assert_eq!(engine(2).quorum(), 2);
        assert_eq!(engine(3).quorum(), 2);
        assert_eq!(engine(5).quorum(), 3);
    }

    #[test]
    fn approves_once_quorum_reached_without_waiting_for_all_seeds() {
        let e = engine(5);
        let p = e.propose_register("x:1".into(), "x".into(), 1);
        e.record_vote(&p.id, "seed-b".into(), true);
        e.record_vote(&p.id, "seed-c".into(), true);
        let (_, decision) = e.decide(&p.id).unwrap();
        assert!(decision.approved);
        assert_eq!(decision.yes, 3);
        assert_eq!(decision.total, 3);
    }

    #[test]
    fn rejects_when_all_seeds_voted_and_quorum_not_met() {
        let e = engine(4);
        let p = e.propose_register("x:1".into(), "x".into(), 1);
        e.record_vote(&p.id, "seed-b".into(), false);
        e.record_vote(&p.id, "seed-c".into(), false);
        e.record_vote(&p.id, "seed-d".into(), false);
        let (_, decision) = e.decide(&p.id).unwrap();
        assert!(!decision.approved);
    }

    #[test]
    fn permissive_degraded_mode_accepts_any_yes_vote_short_of_full_tally() {
        let e = engine(5);
        let p = e.propose_register("x:1".into(), "x".into(), 1);
        let (_, decision) = e.decide(&p.id).unwrap();
        assert!(decision.approved);
        assert_eq!(decision.yes, 1);
    }

    #[test]
    fn strict_degraded_mode_rejects_without_a_real_quorum() {
        let e = ConsensusEngine::with_degraded_mode("seed-a".into(), 5, DegradedMode::Strict);
        let p = e.propose_register("x:1".into(), "x".into(), 1);
        let (_, decision) = e.decide(&p.id).unwrap();
        assert!(!decision.approved);
    }

    #[test]
    fn deciding_twice_is_a_noop() {
        let e = engine(3);
        let p = e.propose_register("x:1".into(), "x".into(), 1);
        assert!(e.decide(&p.id).is_some());
        assert!(e.decide(&p.id).is_none());
    }

    #[test]
    fn remove_vote_is_no_when_peer_unknown() {
        let e = engine(3);
        let vote = e.receive_remove_proposal("p1", "dead:1".into(), "r:1".into(), 2, "seed-b".into(), false);
        assert!(!vote);
    }

    #[test]
    fn sweep_drops_only_decided_proposals_past_the_cutoff() {
        let e = engine(3);
        let p = e.propose_register("x:1".into(), "x".into(), 1);
        e.decide(&p.id);
        assert_eq!(e.sweep_decided(-1.0), 1);
        assert!(e.get(&p.id).is_none());
    }

    #[test]
    fn proposal_id_is_eight_hex_chars() {
        let id = new_proposal_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
