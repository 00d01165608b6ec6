//! End-to-end integration tests for the gossip overlay node.
//!
//! These drive real seed/peer runtimes over real TCP sockets — no method
//! is called in-process. Each test binds an OS-assigned port, starts the
//! runtime as a background task, and talks to it the way another node on
//! the wire would: through `overlay_node::net`.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use overlay_core::eventlog::default_log_path;
use overlay_core::identity::peer_id;
use overlay_core::wire::{GossipPayload, Message, RegisterRequestPayload};
use overlay_node::metrics::NodeMetrics;
use overlay_node::net;
use overlay_node::peer::{self, PeerConfig};
use overlay_node::seed::{self, SeedConfig};

/// Reserves a real ephemeral port by letting the OS pick one, then
/// releasing it immediately so the runtime under test can bind it.
fn alloc_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

#[tokio::test]
async fn get_peer_list_round_trips_over_a_real_socket() {
    let seed_port = alloc_port();
    let data_dir = tempfile::tempdir().unwrap();
    let config_path = data_dir.path().join("config.txt");
    std::fs::write(&config_path, format!("127.0.0.1:{seed_port}\n")).unwrap();

    let handle = tokio::spawn(seed::run(
        SeedConfig {
            host: "127.0.0.1".into(),
            port: seed_port,
            config_path,
            data_dir: data_dir.path().to_path_buf(),
            metrics_port: None,
        },
        Arc::new(NodeMetrics::new()),
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let addr = format!("127.0.0.1:{seed_port}");
    let register = Message::RegisterRequest(RegisterRequestPayload { host: "127.0.0.1".into(), port: 9001 });
    let replies = net::send_request(&addr, &register, Duration::from_secs(2)).await;
    assert!(matches!(replies.as_slice(), [Message::RegisterAck(_)]), "expected a single REGISTER_ACK, got {replies:?}");

    let replies = net::send_request(&addr, &Message::GetPeerList, Duration::from_secs(2)).await;
    let Some(Message::PeerList(list)) = replies.into_iter().next() else {
        panic!("expected a PEER_LIST reply");
    };
    let expected_id = peer_id("127.0.0.1", 9001);
    let entry = list.peers.get(&expected_id).expect("registered peer must appear in the peer list");
    assert_eq!(entry.port, 9001);

    handle.abort();
}

#[tokio::test]
async fn duplicate_gossip_over_the_wire_is_delivered_once() {
    let peer_port = alloc_port();
    let data_dir = tempfile::tempdir().unwrap();
    let config_path = data_dir.path().join("config.txt");
    std::fs::write(&config_path, "# no seeds reachable in this test\n").unwrap();

    let handle = tokio::spawn(peer::run(
        PeerConfig {
            host: "127.0.0.1".into(),
            port: peer_port,
            config_path,
            data_dir: data_dir.path().to_path_buf(),
            metrics_port: None,
        },
        Arc::new(NodeMetrics::new()),
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let addr = format!("127.0.0.1:{peer_port}");
    let gossip = Message::Gossip(GossipPayload {
        msg_id: "e2e-test:1".into(),
        msg_hash: "deadbeefcafe".into(),
        sender: "127.0.0.1:1".into(),
    });
    net::send_fire_and_forget(&addr, &gossip, Duration::from_secs(2)).await;
    net::send_fire_and_forget(&addr, &gossip, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let log_path = default_log_path(data_dir.path());
    let contents = std::fs::read_to_string(&log_path).unwrap();
    let received = contents.lines().filter(|line| line.contains("msg=e2e-test:1")).count();
    assert_eq!(received, 1, "duplicate GOSSIP over the wire must be recorded once, log:\n{contents}");

    handle.abort();
}
