//! # Seed Runtime
//!
//! Wires [`overlay_core::membership`] and [`overlay_core::consensus`]
//! into a running TCP node: a listener that dispatches the seed-facing
//! wire messages (§6), and a periodic sync task that exchanges full
//! membership snapshots with every other configured seed (§4.4).
//!
//! A seed's request-handling task owns a connection end to end, including
//! across the (possibly multi-second) consensus round a `REGISTER_REQUEST`
//! or `DEAD_NODE_REPORT` triggers — there's no separate pending-connection
//! table, since the async task that received the request is already the
//! one that blocks (awaits) on the decision (§9 "request/response held
//! open across consensus").

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use overlay_core::config::{self, SeedSpec};
use overlay_core::consensus::ConsensusEngine;
use overlay_core::error::OverlayError;
use overlay_core::eventlog::{default_log_path, EventLog, Role};
use overlay_core::identity::peer_id;
use overlay_core::membership::{MembershipSet, PeerEntry};
use overlay_core::wire::{
    DeadNodeReportPayload, Message, PeerListPayload, ProposeRegisterPayload, ProposeRemovePayload,
    RegisterAckPayload, SeedSyncPayload, VotePayload,
};

use crate::api::StatusProvider;
use crate::metrics::NodeMetrics;
use crate::net;

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// CLI-resolved configuration for running a seed.
pub struct SeedConfig {
    pub host: String,
    pub port: u16,
    pub config_path: std::path::PathBuf,
    pub data_dir: std::path::PathBuf,
    pub metrics_port: Option<u16>,
}

struct SeedShared {
    my_id: String,
    other_seeds: Vec<SeedSpec>,
    membership: MembershipSet,
    consensus: ConsensusEngine,
    eventlog: EventLog,
    metrics: Arc<NodeMetrics>,
}

impl SeedShared {
    async fn on_register_request(&self, host: String, port: u16) -> Message {
        let req_id = peer_id(&host, port);

        if self.membership.contains(&req_id) {
            self.eventlog.info(&format!("Peer {req_id} already registered — sending ACK"));
            return Message::RegisterAck(RegisterAckPayload {
                peer_id: req_id,
                message: "Already registered".into(),
            });
        }

        let proposal = self.consensus.propose_register(req_id.clone(), host.clone(), port);
        self.eventlog.info(&format!(
            "PROPOSAL: Register peer {req_id}  [id={}, self-vote=YES, votes=1/{} needed]",
            proposal.id,
            self.consensus.quorum()
        ));

        let replies = self
            .broadcast_proposal(Message::ProposeRegister(ProposeRegisterPayload {
                proposal_id: proposal.id.clone(),
                peer_host: host.clone(),
                peer_port: port,
                peer_id: req_id.clone(),
                proposer: self.my_id.clone(),
            }))
            .await;

        for reply in replies {
            if let Message::VoteRegister(v) = reply {
                if v.proposal_id == proposal.id {
                    self.consensus.record_vote(&proposal.id, v.voter.clone(), v.vote);
                    self.eventlog.info(&format!(
                        "Vote from {}: {}",
                        v.voter,
                        if v.vote { "YES" } else { "NO" }
                    ));
                }
            }
        }

        let Some((_, decision)) = self.consensus.decide(&proposal.id) else {
            return Message::RegisterNack(RegisterAckPayload {
                peer_id: req_id,
                message: "Registration could not be decided".into(),
            });
        };

        if decision.approved {
            self.metrics.proposals_approved_total.inc();
            self.membership.insert(req_id.clone(), PeerEntry { host, port, joined_at: now() });
            self.metrics.membership_size.set(self.membership.len() as i64);
            self.eventlog.info(&format!(
                "CONSENSUS OUTCOME — APPROVED: Peer {req_id}  [votes={}/{}, quorum={}]",
                decision.yes,
                decision.total,
                self.consensus.quorum()
            ));
            Message::RegisterAck(RegisterAckPayload {
                peer_id: req_id,
                message: format!("Registration approved ({} votes)", decision.yes),
            })
        } else {
            self.metrics.proposals_rejected_total.inc();
            self.eventlog.info(&format!(
                "CONSENSUS OUTCOME — REJECTED: Peer {req_id}  [votes={}/{}, quorum={}]",
                decision.yes,
                decision.total,
                self.consensus.quorum()
            ));
            Message::RegisterNack(RegisterAckPayload {
                peer_id: req_id,
                message: "Registration rejected — quorum not met".into(),
            })
        }
    }

    async fn on_dead_node_report(&self, payload: DeadNodeReportPayload) {
        self.eventlog.info(&format!("Dead-node report received: {}", payload.report_string));
        self.eventlog
            .info(&format!("Reporter={}, peer-level votes={}", payload.reporter_id, payload.peer_votes));

        if !self.membership.contains(&payload.dead_peer_id) {
            self.eventlog.warn(&format!("Dead node {} not in Peer List — ignoring", payload.dead_peer_id));
            return;
        }

        let proposal =
            self.consensus.propose_remove(payload.dead_peer_id.clone(), payload.reporter_id.clone(), payload.peer_votes);
        self.eventlog.info(&format!(
            "PROPOSAL: Remove dead peer {}  [id={}, reporter={}]",
            payload.dead_peer_id, proposal.id, payload.reporter_id
        ));

        let replies = self
            .broadcast_proposal(Message::ProposeRemove(ProposeRemovePayload {
                proposal_id: proposal.id.clone(),
                peer_id: payload.dead_peer_id.clone(),
                reporter: payload.reporter_id.clone(),
                peer_votes: payload.peer_votes,
                proposer: self.my_id.clone(),
            }))
            .await;

        for reply in replies {
            if let Message::VoteRemove(v) = reply {
                if v.proposal_id == proposal.id {
                    self.consensus.record_vote(&proposal.id, v.voter.clone(), v.vote);
                    self.eventlog.info(&format!(
                        "Removal vote from {}: {}",
                        v.voter,
                        if v.vote { "YES" } else { "NO" }
                    ));
                }
            }
        }

        let Some((_, decision)) = self.consensus.decide(&proposal.id) else { return };

        if decision.approved {
            self.metrics.proposals_approved_total.inc();
            if self.membership.remove(&payload.dead_peer_id).is_some() {
                self.metrics.membership_size.set(self.membership.len() as i64);
                self.metrics.removals_confirmed_total.inc();
                self.eventlog.info(&format!(
                    "CONFIRMED REMOVAL: Peer {} removed from Peer List  [seed votes={}/{}]",
                    payload.dead_peer_id,
                    decision.yes,
                    self.consensus.quorum()
                ));
            } else {
                self.eventlog.info(&format!("Peer {} already removed", payload.dead_peer_id));
            }
        } else {
            self.metrics.proposals_rejected_total.inc();
            self.eventlog.info(&format!(
                "Removal REJECTED for {} — only {}/{} seed votes",
                payload.dead_peer_id,
                decision.yes,
                self.consensus.quorum()
            ));
        }
    }

    async fn on_propose_register(&self, payload: ProposeRegisterPayload) -> Message {
        self.eventlog.info(&format!(
            "Received registration proposal {} for {} from {}",
            payload.proposal_id, payload.peer_id, payload.proposer
        ));
        let vote = self.consensus.receive_register_proposal(
            &payload.proposal_id,
            payload.peer_id.clone(),
            payload.peer_host.clone(),
            payload.peer_port,
            payload.proposer.clone(),
        );
        self.eventlog
            .info(&format!("Voting {} on proposal {}", if vote { "YES" } else { "NO" }, payload.proposal_id));
        Message::VoteRegister(VotePayload { proposal_id: payload.proposal_id, voter: self.my_id.clone(), vote })
    }

    async fn on_propose_remove(&self, payload: ProposeRemovePayload) -> Message {
        self.eventlog.info(&format!(
            "Received removal proposal {} for {} from {}",
            payload.proposal_id, payload.peer_id, payload.proposer
        ));
        let known = self.membership.contains(&payload.peer_id);
        if !known {
            self.eventlog.warn(&format!("Peer {} not in our list — voting NO", payload.peer_id));
        }
        let vote = self.consensus.receive_remove_proposal(
            &payload.proposal_id,
            payload.peer_id.clone(),
            payload.reporter.clone(),
            payload.peer_votes,
            payload.proposer.clone(),
            known,
        );
        self.eventlog
            .info(&format!("Voting {} on removal {}", if vote { "YES" } else { "NO" }, payload.proposal_id));
        Message::VoteRemove(VotePayload { proposal_id: payload.proposal_id, voter: self.my_id.clone(), vote })
    }

    fn on_get_peer_list(&self) -> Message {
        let peers = self.membership.snapshot();
        self.eventlog.info(&format!("Sending Peer List ({} peers)", peers.len()));
        Message::PeerList(PeerListPayload { peers, seed_id: self.my_id.clone() })
    }

    fn on_seed_sync(&self, payload: SeedSyncPayload) {
        for id in self.membership.merge(&payload.peers) {
            self.eventlog.info(&format!("Merged peer {id} from seed sync"));
        }
        self.metrics.membership_size.set(self.membership.len() as i64);
    }

    /// Broadcasts `msg` (a `PROPOSE_*`) to every other seed concurrently
    /// and returns every decoded reply. Unreachable seeds simply
    /// contribute nothing to the result (§7 `NetworkUnreachable`/`Timeout`).
    async fn broadcast_proposal(&self, msg: Message) -> Vec<Message> {
        let futs = self.other_seeds.iter().map(|seed| {
            let addr = format!("{}:{}", seed.host, seed.port);
            let msg = msg.clone();
            async move { net::send_request(&addr, &msg, config::VOTE_COLLECTION_TIMEOUT).await }
        });
        futures::future::join_all(futs).await.into_iter().flatten().collect()
    }
}

async fn dispatch(shared: &SeedShared, msg: Message) -> Option<Message> {
    match msg {
        Message::RegisterRequest(p) => Some(shared.on_register_request(p.host, p.port).await),
        Message::GetPeerList => Some(shared.on_get_peer_list()),
        Message::DeadNodeReport(p) => {
            shared.on_dead_node_report(p).await;
            None
        }
        Message::ProposeRegister(p) => Some(shared.on_propose_register(p).await),
        Message::VoteRegister(p) => {
            shared.consensus.record_vote(&p.proposal_id, p.voter, p.vote);
            None
        }
        Message::ProposeRemove(p) => Some(shared.on_propose_remove(p).await),
        Message::VoteRemove(p) => {
            shared.consensus.record_vote(&p.proposal_id, p.voter, p.vote);
            None
        }
        Message::SeedSync(p) => {
            shared.on_seed_sync(p);
            None
        }
        other => {
            shared.eventlog.warn(&format!("Unexpected message type on seed listener: {other:?}"));
            None
        }
    }
}

async fn handle_connection(stream: TcpStream, _addr: SocketAddr, shared: Arc<SeedShared>) {
    net::serve_connection(stream, |msg| {
        let shared = Arc::clone(&shared);
        async move { dispatch(&shared, msg).await }
    })
    .await;
}

fn make_handler(shared: Arc<SeedShared>) -> Arc<dyn Fn(TcpStream, SocketAddr) -> net::BoxFuture<'static, ()> + Send + Sync> {
    Arc::new(move |stream, addr| {
        let shared = Arc::clone(&shared);
        Box::pin(handle_connection(stream, addr, shared))
    })
}

async fn sync_loop(shared: Arc<SeedShared>, running: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(config::SYNC_INTERVAL);
    interval.tick().await; // first tick fires immediately; skip it
    while running.load(Ordering::SeqCst) {
        interval.tick().await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let snapshot = shared.membership.snapshot();
        let futs = shared.other_seeds.iter().map(|seed| {
            let addr = format!("{}:{}", seed.host, seed.port);
            let msg = Message::SeedSync(SeedSyncPayload { peers: snapshot.clone(), sender: shared.my_id.clone() });
            async move { net::send_fire_and_forget(&addr, &msg, config::SYNC_TIMEOUT).await }
        });
        futures::future::join_all(futs).await;
        shared.consensus.sweep_decided(config::SYNC_INTERVAL.as_secs_f64());
    }
}

/// Runs a seed node to completion: binds its listener, starts the sync
/// loop, and blocks until a shutdown signal arrives.
pub async fn run(cfg: SeedConfig, metrics: Arc<NodeMetrics>) -> Result<()> {
    let my_id = peer_id(&cfg.host, cfg.port);
    let seeds = overlay_core::config::load_seed_list(&cfg.config_path)
        .with_context(|| format!("failed to read seed config at {}", cfg.config_path.display()))?;
    let other_seeds: Vec<SeedSpec> =
        seeds.iter().filter(|s| peer_id(&s.host, s.port) != my_id).cloned().collect();
    let total_seeds = seeds.len().max(1);

    let eventlog = EventLog::open(Role::Seed, cfg.port, default_log_path(&cfg.data_dir))
        .context("failed to open event log")?;
    eventlog.info(&format!("Seed node initialized at {my_id}"));
    eventlog.info(&format!("Total seeds: {total_seeds}, Quorum: {}", total_seeds / 2 + 1));
    eventlog.info(&format!(
        "Other seeds: {:?}",
        other_seeds.iter().map(|s| peer_id(&s.host, s.port)).collect::<Vec<_>>()
    ));

    let shared = Arc::new(SeedShared {
        my_id,
        other_seeds,
        membership: MembershipSet::new(),
        consensus: ConsensusEngine::new(peer_id(&cfg.host, cfg.port), total_seeds),
        eventlog,
        metrics,
    });

    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .map_err(|e| OverlayError::BindFailure(format!("{}:{} ({e})", cfg.host, cfg.port)))
        .with_context(|| "failed to bind seed listener")?;
    shared.eventlog.info(&format!("Seed node listening on {}:{}", cfg.host, cfg.port));

    let running = Arc::new(AtomicBool::new(true));
    let accept_handle = tokio::spawn(net::accept_loop(listener, Arc::clone(&running), make_handler(Arc::clone(&shared))));
    let sync_handle = tokio::spawn(sync_loop(Arc::clone(&shared), Arc::clone(&running)));
    let api_handle = crate::spawn_api_server(cfg.metrics_port, Arc::clone(&shared) as _, Arc::clone(&shared.metrics)).await?;

    crate::shutdown_signal().await;
    shared.eventlog.info("Shutting down seed node…");
    running.store(false, Ordering::SeqCst);
    accept_handle.abort();
    sync_handle.abort();
    if let Some(handle) = api_handle {
        handle.abort();
    }
    shared.eventlog.info("Seed node stopped.");
    Ok(())
}

impl StatusProvider for SeedShared {
    fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "role": "seed",
            "seed_id": self.my_id,
            "total_seeds": self.consensus.total_seeds(),
            "quorum": self.consensus.quorum(),
            "membership_size": self.membership.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::consensus::ConsensusEngine;

    fn lone_seed() -> SeedShared {
        SeedShared {
            my_id: "127.0.0.1:6000".into(),
            other_seeds: Vec::new(),
            membership: MembershipSet::new(),
            consensus: ConsensusEngine::new("127.0.0.1:6000".into(), 1),
            eventlog: EventLog::open(Role::Seed, 6000, tempfile::tempdir().unwrap().keep().join("outputfile.txt")).unwrap(),
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    #[tokio::test]
    async fn register_request_is_approved_by_a_lone_seed() {
        let shared = lone_seed();
        let reply = shared.on_register_request("127.0.0.1".into(), 7000).await;
        assert!(matches!(reply, Message::RegisterAck(_)));
        assert!(shared.membership.contains("127.0.0.1:7000"));
    }

    #[tokio::test]
    async fn repeated_register_request_is_idempotent() {
        let shared = lone_seed();
        shared.on_register_request("127.0.0.1".into(), 7000).await;
        let reply = shared.on_register_request("127.0.0.1".into(), 7000).await;
        assert!(matches!(reply, Message::RegisterAck(_)));
        assert_eq!(shared.membership.len(), 1);
    }

    #[test]
    fn get_peer_list_reflects_current_membership() {
        let shared = lone_seed();
        shared.membership.insert("127.0.0.1:7000".into(), PeerEntry { host: "127.0.0.1".into(), port: 7000, joined_at: 0.0 });
        let Message::PeerList(payload) = shared.on_get_peer_list() else { panic!("expected PeerList") };
        assert_eq!(payload.peers.len(), 1);
        assert_eq!(payload.seed_id, shared.my_id);
    }

    #[tokio::test]
    async fn dead_node_report_for_unknown_peer_is_ignored() {
        let shared = lone_seed();
        shared
            .on_dead_node_report(DeadNodeReportPayload {
                dead_peer_id: "127.0.0.1:9999".into(),
                reporter_id: "127.0.0.1:7000".into(),
                peer_votes: 2,
                timestamp: 1.0,
                report_string: "Dead Node:127.0.0.1:9999:1:127.0.0.1".into(),
            })
            .await;
        assert!(shared.membership.is_empty());
    }

    #[tokio::test]
    async fn dead_node_report_for_known_peer_removes_it() {
        let shared = lone_seed();
        shared.membership.insert("127.0.0.1:7000".into(), PeerEntry { host: "127.0.0.1".into(), port: 7000, joined_at: 0.0 });
        shared
            .on_dead_node_report(DeadNodeReportPayload {
                dead_peer_id: "127.0.0.1:7000".into(),
                reporter_id: "127.0.0.1:7001".into(),
                peer_votes: 2,
                timestamp: 1.0,
                report_string: "Dead Node:127.0.0.1:7000:1:127.0.0.1".into(),
            })
            .await;
        assert!(!shared.membership.contains("127.0.0.1:7000"));
    }

    #[tokio::test]
    async fn propose_register_from_remote_seed_always_votes_yes() {
        let shared = lone_seed();
        let reply = shared
            .on_propose_register(ProposeRegisterPayload {
                proposal_id: "abc12345".into(),
                peer_host: "127.0.0.1".into(),
                peer_port: 7000,
                peer_id: "127.0.0.1:7000".into(),
                proposer: "127.0.0.1:6001".into(),
            })
            .await;
        let Message::VoteRegister(vote) = reply else { panic!("expected VoteRegister") };
        assert!(vote.vote);
    }

    #[tokio::test]
    async fn propose_remove_from_remote_seed_votes_no_for_unknown_peer() {
        let shared = lone_seed();
        let reply = shared
            .on_propose_remove(ProposeRemovePayload {
                proposal_id: "abc12345".into(),
                peer_id: "127.0.0.1:7000".into(),
                reporter: "127.0.0.1:7001".into(),
                peer_votes: 2,
                proposer: "127.0.0.1:6001".into(),
            })
            .await;
        let Message::VoteRemove(vote) = reply else { panic!("expected VoteRemove") };
        assert!(!vote.vote);
    }

    #[test]
    fn seed_sync_merges_unknown_peers_without_deleting_existing() {
        let shared = lone_seed();
        shared.membership.insert("127.0.0.1:7000".into(), PeerEntry { host: "127.0.0.1".into(), port: 7000, joined_at: 0.0 });
        let mut remote = std::collections::HashMap::new();
        remote.insert("127.0.0.1:7001".into(), PeerEntry { host: "127.0.0.1".into(), port: 7001, joined_at: 0.0 });
        shared.on_seed_sync(SeedSyncPayload { peers: remote, sender: "127.0.0.1:6001".into() });
        assert_eq!(shared.membership.len(), 2);
    }
}
