//! # Peer Runtime
//!
//! A peer registers with a quorum of its configured seeds, fetches the
//! union of their membership views, builds a small Zipf-weighted overlay
//! over it, and then runs three independent periodic loops: gossip
//! generation/forwarding, neighbor pinging, and suspicion escalation to
//! the seeds once a neighbor goes quiet (§4.5–§4.7).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::net::{TcpListener, TcpStream};

use overlay_core::config::{self, SeedSpec};
use overlay_core::error::OverlayError;
use overlay_core::eventlog::{default_log_path, EventLog, Role};
use overlay_core::failure::{dead_node_message_for, decide_peer_consensus, SuspicionTracker};
use overlay_core::gossip::{hash_message, message_id, GossipStore};
use overlay_core::identity::peer_id;
use overlay_core::membership::PeerEntry;
use overlay_core::overlay::build_overlay;
use overlay_core::wire::{
    DeadNodeReportPayload, GossipPayload, Message, PingPongPayload, SuspectQueryPayload,
    SuspectResponsePayload,
};

use crate::api::StatusProvider;
use crate::metrics::NodeMetrics;
use crate::net;

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// CLI-resolved configuration for running a peer.
pub struct PeerConfig {
    pub host: String,
    pub port: u16,
    pub config_path: std::path::PathBuf,
    pub data_dir: std::path::PathBuf,
    pub metrics_port: Option<u16>,
}

struct PeerShared {
    my_id: String,
    host: String,
    port: u16,
    seeds: Vec<SeedSpec>,
    known_peers: Mutex<HashMap<String, PeerEntry>>,
    neighbors: Mutex<HashMap<String, PeerEntry>>,
    gossip: GossipStore,
    suspicion: SuspicionTracker,
    eventlog: EventLog,
    metrics: Arc<NodeMetrics>,
}

impl PeerShared {
    fn neighbor_addrs(&self, exclude: Option<&str>) -> Vec<(String, String)> {
        self.neighbors
            .lock()
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != exclude)
            .map(|(id, entry)| (id.clone(), format!("{}:{}", entry.host, entry.port)))
            .collect()
    }

    /// Registers with enough seeds for quorum. Sends `REGISTER_REQUEST` to
    /// every configured seed concurrently; succeeds once at least one ACK
    /// comes back, matching the reference peer's "ack_count >= 1" rule —
    /// the heavy lifting (actual quorum) already happened seed-side.
    async fn register_with_seeds(&self) -> bool {
        let required = self.seeds.len() / 2 + 1;
        self.eventlog.info(&format!(
            "Registering with seeds (have {}, need at least {required} contacted)",
            self.seeds.len()
        ));

        let mut seeds = self.seeds.clone();
        {
            let mut rng = rand::thread_rng();
            seeds.shuffle(&mut rng);
        }
        seeds.truncate(required);

        let msg = Message::RegisterRequest(overlay_core::wire::RegisterRequestPayload {
            host: self.host.clone(),
            port: self.port,
        });

        let futs = seeds.iter().map(|seed| {
            let addr = format!("{}:{}", seed.host, seed.port);
            let msg = msg.clone();
            async move { (addr.clone(), net::send_request(&addr, &msg, config::REGISTER_TIMEOUT).await) }
        });
        let results = futures::future::join_all(futs).await;

        let mut ack_count = 0;
        for (addr, replies) in results {
            for reply in replies {
                match reply {
                    Message::RegisterAck(p) => {
                        ack_count += 1;
                        self.eventlog.info(&format!("Registered with seed {addr}: {}", p.message));
                    }
                    Message::RegisterNack(p) => {
                        self.eventlog.warn(&format!("Seed {addr} rejected registration: {}", p.message));
                    }
                    _ => {}
                }
            }
        }

        let ok = ack_count >= 1;
        if ok {
            self.eventlog.info(&format!("Registration successful ({ack_count} seed(s) acknowledged)"));
        } else {
            self.eventlog.warn("Registration failed — no seed acknowledged");
        }
        ok
    }

    /// Fetches the peer list from every configured seed and unions them,
    /// excluding this peer's own id.
    async fn fetch_peer_lists(&self) {
        let futs = self.seeds.iter().map(|seed| {
            let addr = format!("{}:{}", seed.host, seed.port);
            async move { (addr.clone(), net::send_request(&addr, &Message::GetPeerList, config::PEER_LIST_TIMEOUT).await) }
        });
        let results = futures::future::join_all(futs).await;

        let mut known = self.known_peers.lock();
        for (addr, replies) in results {
            for reply in replies {
                if let Message::PeerList(p) = reply {
                    self.eventlog.info(&format!("Received peer list from {addr} ({} peers)", p.peers.len()));
                    known.extend(p.peers);
                }
            }
        }
        known.remove(&self.my_id);
    }

    fn build_overlay(&self) {
        let known = self.known_peers.lock().clone();
        let overlay = build_overlay(&known, &self.my_id, config::MIN_DEGREE, config::MAX_DEGREE);
        self.eventlog.info(&format!(
            "Overlay built: {} neighbor(s) out of {} known peer(s)",
            overlay.len(),
            known.len()
        ));
        self.metrics.active_neighbors.set(overlay.len() as i64);
        *self.neighbors.lock() = overlay;
    }

    async fn generate_gossip(&self) -> bool {
        let Some(msg_num) = self.gossip.try_claim_next(config::MAX_GOSSIP_MESSAGES) else {
            return false;
        };
        let ts = now();
        let msg_id = message_id(ts, &self.host, self.port, msg_num);
        let hash = hash_message(&msg_id);
        self.gossip.record_originated(msg_id.clone(), hash.clone(), ts, self.my_id.clone());
        self.eventlog.info(&format!(
            "Generated gossip #{msg_num}/{}: {msg_id}",
            config::MAX_GOSSIP_MESSAGES
        ));
        self.metrics.gossip_generated_total.inc();
        self.forward_gossip(&msg_id, &hash, None).await;
        true
    }

    async fn forward_gossip(&self, msg_id: &str, msg_hash: &str, sender: Option<&str>) {
        self.metrics.gossip_forwarded_total.inc();
        let targets = self.neighbor_addrs(sender);
        let msg = Message::Gossip(GossipPayload {
            msg_id: msg_id.to_string(),
            msg_hash: msg_hash.to_string(),
            sender: self.my_id.clone(),
        });
        let futs = targets.into_iter().map(|(_, addr)| {
            let msg = msg.clone();
            async move { net::send_fire_and_forget(&addr, &msg, config::PEER_SEND_TIMEOUT).await }
        });
        futures::future::join_all(futs).await;
    }

    async fn on_gossip(&self, payload: GossipPayload) {
        let ts = now();
        let is_new = self.gossip.record_received(payload.msg_id.clone(), payload.msg_hash.clone(), ts, payload.sender.clone());
        if !is_new {
            return;
        }
        self.eventlog.info(&format!(
            "Gossip received [from={}, msg={}, time={ts}]",
            payload.sender, payload.msg_id
        ));
        self.forward_gossip(&payload.msg_id, &payload.msg_hash, Some(&payload.sender)).await;
    }

    async fn ping_all_neighbors(&self) {
        let targets = self.neighbor_addrs(None);
        let msg = Message::Ping(PingPongPayload { sender: self.my_id.clone(), timestamp: now() });

        let futs = targets.into_iter().map(|(id, addr)| {
            let msg = msg.clone();
            async move { (id, net::send_request(&addr, &msg, config::PING_TIMEOUT).await) }
        });
        let results = futures::future::join_all(futs).await;

        for (id, replies) in results {
            let got_pong = replies.iter().any(|m| matches!(m, Message::Pong(_)));
            if got_pong {
                self.suspicion.record_pong(&id);
            } else {
                self.suspicion.record_miss(&id);
            }
        }
    }

    async fn check_suspicions(&self) {
        for suspect in self.suspicion.take_new_suspects(config::SUSPICION_THRESHOLD) {
            self.metrics.suspicion_rounds_initiated_total.inc();
            self.eventlog.warn(&format!("Neighbor {suspect} suspected dead — starting peer consensus"));
            let others = self.neighbor_addrs(Some(&suspect));
            let total = others.len() + 1;

            let query = Message::SuspectQuery(SuspectQueryPayload { sender: self.my_id.clone(), suspect: suspect.clone() });
            let futs = others.into_iter().map(|(_, addr)| {
                let query = query.clone();
                async move { net::send_request(&addr, &query, config::SUSPECT_QUERY_TIMEOUT).await }
            });
            let replies: Vec<Message> = futures::future::join_all(futs).await.into_iter().flatten().collect();

            let mut confirm = 1; // self
            for reply in replies {
                if let Message::SuspectResponse(r) = reply {
                    if r.confirmed {
                        confirm += 1;
                    }
                }
            }

            let result = decide_peer_consensus(confirm, total);
            if result.confirmed() {
                self.metrics.suspicion_rounds_confirmed_total.inc();
                self.eventlog.info(&format!(
                    "PEER CONSENSUS REACHED: {suspect} confirmed dead [{}/{} , quorum={}]",
                    result.confirm, result.total, result.quorum
                ));
                self.report_dead_node(&suspect, result.confirm as u32).await;
                self.neighbors.lock().remove(&suspect);
                self.metrics.active_neighbors.set(self.neighbors.lock().len() as i64);
            } else {
                self.eventlog.info(&format!(
                    "Suspicion cancelled for {suspect} [{}/{}, quorum={}]",
                    result.confirm, result.total, result.quorum
                ));
                self.suspicion.cancel_suspicion(&suspect);
            }
        }
    }

    async fn report_dead_node(&self, dead_id: &str, peer_votes: u32) {
        let ts = now();
        let Some(report_string) = dead_node_message_for(dead_id, ts, &self.host) else {
            self.eventlog.warn(&format!("Cannot build dead-node report for malformed id {dead_id}"));
            return;
        };
        self.eventlog.info(&format!("DEAD NODE REPORT: {report_string}"));

        let msg = Message::DeadNodeReport(DeadNodeReportPayload {
            dead_peer_id: dead_id.to_string(),
            reporter_id: self.my_id.clone(),
            peer_votes,
            timestamp: ts,
            report_string,
        });
        let futs = self.seeds.iter().map(|seed| {
            let addr = format!("{}:{}", seed.host, seed.port);
            let msg = msg.clone();
            async move { net::send_fire_and_forget(&addr, &msg, config::PEER_SEND_TIMEOUT).await }
        });
        futures::future::join_all(futs).await;
    }

    async fn on_suspect_query(&self, payload: SuspectQueryPayload) -> Message {
        let mut confirmed = self.suspicion.has_any_miss(&payload.suspect);
        if !confirmed {
            let known = self.known_peers.lock().get(&payload.suspect).cloned();
            if let Some(entry) = known {
                let addr = format!("{}:{}", entry.host, entry.port);
                let probe = Message::Ping(PingPongPayload { sender: self.my_id.clone(), timestamp: now() });
                let replies = net::send_request(&addr, &probe, config::PING_TIMEOUT).await;
                confirmed = !replies.iter().any(|m| matches!(m, Message::Pong(_)));
            }
        }
        Message::SuspectResponse(SuspectResponsePayload {
            sender: self.my_id.clone(),
            suspect: payload.suspect,
            confirmed,
        })
    }
}

impl StatusProvider for PeerShared {
    fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "role": "peer",
            "peer_id": self.my_id,
            "known_peers": self.known_peers.lock().len(),
            "neighbors": self.neighbors.lock().keys().cloned().collect::<Vec<_>>(),
            "gossip_originated": self.gossip.originated_count(),
        })
    }
}

async fn dispatch(shared: &PeerShared, msg: Message) -> Option<Message> {
    match msg {
        Message::Ping(p) => Some(Message::Pong(PingPongPayload { sender: shared.my_id.clone(), timestamp: p.timestamp })),
        Message::Gossip(p) => {
            shared.on_gossip(p).await;
            None
        }
        Message::SuspectQuery(p) => Some(shared.on_suspect_query(p).await),
        other => {
            shared.eventlog.warn(&format!("Unexpected message type on peer listener: {other:?}"));
            None
        }
    }
}

async fn handle_connection(stream: TcpStream, _addr: SocketAddr, shared: Arc<PeerShared>) {
    net::serve_connection(stream, |msg| {
        let shared = Arc::clone(&shared);
        async move { dispatch(&shared, msg).await }
    })
    .await;
}

fn make_handler(shared: Arc<PeerShared>) -> Arc<dyn Fn(TcpStream, SocketAddr) -> net::BoxFuture<'static, ()> + Send + Sync> {
    Arc::new(move |stream, addr| {
        let shared = Arc::clone(&shared);
        Box::pin(handle_connection(stream, addr, shared))
    })
}

async fn gossip_loop(shared: Arc<PeerShared>, running: Arc<AtomicBool>) {
    tokio::time::sleep(config::GOSSIP_SETTLE_DELAY).await;
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if shared.gossip.originated_count() >= config::MAX_GOSSIP_MESSAGES {
            break;
        }
        shared.generate_gossip().await;
        tokio::time::sleep(config::GOSSIP_INTERVAL).await;
    }
}

/// Runs a peer node to completion: registers, builds its overlay, starts
/// the gossip and liveness loops, and blocks until a shutdown signal.
pub async fn run(cfg: PeerConfig, metrics: Arc<NodeMetrics>) -> Result<()> {
    let my_id = peer_id(&cfg.host, cfg.port);
    let seeds = overlay_core::config::load_seed_list(&cfg.config_path)
        .with_context(|| format!("failed to read seed config at {}", cfg.config_path.display()))?;

    let eventlog = EventLog::open(Role::Peer, cfg.port, default_log_path(&cfg.data_dir))
        .context("failed to open event log")?;
    eventlog.info(&format!("Peer node initialized at {my_id}"));

    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .map_err(|e| OverlayError::BindFailure(format!("{}:{} ({e})", cfg.host, cfg.port)))
        .with_context(|| "failed to bind peer listener")?;
    eventlog.info(&format!("Peer node listening on {}:{}", cfg.host, cfg.port));

    let shared = Arc::new(PeerShared {
        my_id,
        host: cfg.host.clone(),
        port: cfg.port,
        seeds,
        known_peers: Mutex::new(HashMap::new()),
        neighbors: Mutex::new(HashMap::new()),
        gossip: GossipStore::new(),
        suspicion: SuspicionTracker::new(),
        eventlog,
        metrics,
    });

    let running = Arc::new(AtomicBool::new(true));
    let accept_handle = tokio::spawn(net::accept_loop(listener, Arc::clone(&running), make_handler(Arc::clone(&shared))));

    if !shared.register_with_seeds().await {
        shared.eventlog.warn("Continuing without confirmed registration — peer list may be empty");
    }
    shared.fetch_peer_lists().await;
    shared.build_overlay();

    let gossip_handle = tokio::spawn(gossip_loop(Arc::clone(&shared), Arc::clone(&running)));
    let liveness_handle = tokio::spawn(liveness_loop(Arc::clone(&shared), Arc::clone(&running)));
    let api_handle = crate::spawn_api_server(cfg.metrics_port, Arc::clone(&shared) as _, Arc::clone(&shared.metrics)).await?;

    crate::shutdown_signal().await;
    shared.eventlog.info("Shutting down peer node…");
    running.store(false, Ordering::SeqCst);
    accept_handle.abort();
    gossip_handle.abort();
    liveness_handle.abort();
    if let Some(handle) = api_handle {
        handle.abort();
    }
    shared.eventlog.info("Peer node stopped.");
    Ok(())
}

async fn liveness_loop(shared: Arc<PeerShared>, running: Arc<AtomicBool>) {
    tokio::time::sleep(config::LIVENESS_SETTLE_DELAY).await;
    while running.load(Ordering::SeqCst) {
        shared.ping_all_neighbors().await;
        tokio::time::sleep(config::PING_INTERVAL).await;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        shared.check_suspicions().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lone_peer() -> PeerShared {
        PeerShared {
            my_id: "127.0.0.1:7000".into(),
            host: "127.0.0.1".into(),
            port: 7000,
            seeds: Vec::new(),
            known_peers: Mutex::new(HashMap::new()),
            neighbors: Mutex::new(HashMap::new()),
            gossip: GossipStore::new(),
            suspicion: SuspicionTracker::new(),
            eventlog: EventLog::open(Role::Peer, 7000, tempfile::tempdir().unwrap().keep().join("outputfile.txt")).unwrap(),
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    fn entry(port: u16) -> PeerEntry {
        PeerEntry { host: "127.0.0.1".into(), port, joined_at: 0.0 }
    }

    #[test]
    fn build_overlay_excludes_self_and_fits_in_known_peers() {
        let shared = lone_peer();
        shared.known_peers.lock().insert("127.0.0.1:7001".into(), entry(7001));
        shared.known_peers.lock().insert("127.0.0.1:7002".into(), entry(7002));
        shared.build_overlay();
        let neighbors = shared.neighbors.lock();
        assert!(!neighbors.contains_key(&shared.my_id));
        assert!(neighbors.len() <= 2);
    }

    #[tokio::test]
    async fn generate_gossip_stops_at_the_cap() {
        let shared = lone_peer();
        for _ in 0..config::MAX_GOSSIP_MESSAGES {
            assert!(shared.generate_gossip().await);
        }
        assert!(!shared.generate_gossip().await);
        assert_eq!(shared.gossip.originated_count(), config::MAX_GOSSIP_MESSAGES);
    }

    #[tokio::test]
    async fn duplicate_gossip_is_recorded_once() {
        let shared = lone_peer();
        let payload = GossipPayload { msg_id: "1:127.0.0.1:7001:1".into(), msg_hash: "deadbeef".into(), sender: "127.0.0.1:7001".into() };
        shared.on_gossip(payload.clone()).await;
        shared.on_gossip(payload).await;
        assert_eq!(shared.gossip.len(), 1);
    }

    #[tokio::test]
    async fn suspect_query_with_no_miss_and_unknown_peer_is_not_confirmed() {
        let shared = lone_peer();
        let reply = shared
            .on_suspect_query(SuspectQueryPayload { sender: "127.0.0.1:7002".into(), suspect: "127.0.0.1:9999".into() })
            .await;
        let Message::SuspectResponse(r) = reply else { panic!("expected SuspectResponse") };
        assert!(!r.confirmed);
    }

    #[tokio::test]
    async fn suspect_query_confirms_when_a_miss_is_already_recorded() {
        let shared = lone_peer();
        shared.suspicion.record_miss("127.0.0.1:9999");
        let reply = shared
            .on_suspect_query(SuspectQueryPayload { sender: "127.0.0.1:7002".into(), suspect: "127.0.0.1:9999".into() })
            .await;
        let Message::SuspectResponse(r) = reply else { panic!("expected SuspectResponse") };
        assert!(r.confirmed);
    }

    #[test]
    fn status_reports_role_and_known_counts() {
        let shared = lone_peer();
        shared.known_peers.lock().insert("127.0.0.1:7001".into(), entry(7001));
        let status = shared.status();
        assert_eq!(status["role"], "peer");
        assert_eq!(status["known_peers"], 1);
    }
}
