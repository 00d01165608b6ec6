//! # Network Primitives
//!
//! Thin helpers around `tokio::net::TcpStream` implementing the two
//! connection shapes every node role uses: fire-and-forget sends and
//! short-lived request/response round-trips, both bounded by a deadline
//! (§4.1, §9 "short-lived per-request connections" — connect, send, read
//! up to the first reply, close). Neither helper retries; a connect
//! failure or elapsed deadline is treated as `NetworkUnreachable`/`Timeout`
//! per §7 — the caller logs and moves on, it never propagates as an error
//! here.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use overlay_core::wire::{decode_frames, Message};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How long a connection handler keeps a connection open between reads
/// before giving up, matching the reference node's `conn.settimeout(10.0)`.
pub const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the accept loop re-checks the `running` flag between
/// `accept()` polls — the async equivalent of the reference server's
/// `settimeout(1.0)` on the listening socket.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Opens a connection to `addr`, writes `msg`, and closes without waiting
/// for a reply. Used for best-effort gossip forwarding and dead-node
/// reports, where nothing is listening for a response on the other end.
pub async fn send_fire_and_forget(addr: &str, msg: &Message, connect_timeout: Duration) {
    let Ok(Ok(mut stream)) = timeout(connect_timeout, TcpStream::connect(addr)).await else {
        return;
    };
    let bytes = msg.encode(now_secs());
    let _ = stream.write_all(&bytes).await;
}

/// Opens a connection, writes `msg`, and waits up to `reply_timeout` for
/// one or more complete reply frames, then closes. Returns whatever
/// decoded messages arrived before the deadline — an empty vec on any
/// connect failure, write failure, or timeout.
pub async fn send_request(addr: &str, msg: &Message, reply_timeout: Duration) -> Vec<Message> {
    let Ok(Ok(mut stream)) = timeout(reply_timeout, TcpStream::connect(addr)).await else {
        return Vec::new();
    };
    let bytes = msg.encode(now_secs());
    if stream.write_all(&bytes).await.is_err() {
        return Vec::new();
    }

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + reply_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                let msgs = decode_frames(&mut buf);
                if !msgs.is_empty() {
                    return msgs;
                }
            }
        }
    }
    decode_frames(&mut buf)
}

/// Accepts connections until `running` goes false, handing each to
/// `handler` on its own task. `handler` owns the connection end to end —
/// reading every frame it carries, dispatching, and writing replies —
/// matching the reference server's one-thread-per-connection model.
pub async fn accept_loop(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    handler: Arc<dyn Fn(TcpStream, SocketAddr) -> BoxFuture<'static, ()> + Send + Sync>,
) {
    while running.load(Ordering::SeqCst) {
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move { handler(stream, addr).await });
            }
            Ok(Err(_)) => break,
            Err(_) => continue,
        }
    }
}

/// Reads every complete frame off `stream`, dispatching each through
/// `dispatch` and writing back any reply, until the peer closes the
/// connection or `CONNECTION_READ_TIMEOUT` elapses with nothing arriving.
/// Messages on one connection are handled strictly in receive order.
pub async fn serve_connection<F, Fut>(mut stream: TcpStream, mut dispatch: F)
where
    F: FnMut(Message) -> Fut,
    Fut: Future<Output = Option<Message>>,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match timeout(CONNECTION_READ_TIMEOUT, stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                for msg in decode_frames(&mut buf) {
                    if let Some(reply) = dispatch(msg).await {
                        let bytes = reply.encode(now_secs());
                        if stream.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
