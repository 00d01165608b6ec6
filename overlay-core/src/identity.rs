//! # Peer Identity
//!
//! A `PeerId` is nothing more than its `host:port` string — there is no
//! cryptographic identity in this system (see the crate's Non-goals).
//! Equality is string equality after normalization; the hard part is
//! keeping the host/port split consistent for the rare hostname that
//! itself contains a colon (we don't support that — see `parse_peer_id`).

/// Builds the canonical `PeerId` string for a host/port pair.
pub fn peer_id(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// Splits a canonical `PeerId` back into `(host, port)`. Splits on the
/// *last* colon so dotted-quad and hostname forms both work.
pub fn parse_peer_id(id: &str) -> Option<(String, u16)> {
    let (host, port_str) = id.rsplit_once(':')?;
    let port = port_str.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}
