//! # Overlay Configuration & Constants
//!
//! Every tunable of the gossip overlay lives here. These values are design
//! defaults from the reference deployment; changing them is safe at any
//! time since no on-disk or cross-process format depends on them — they
//! only affect timing and topology shape.

use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// How often a peer generates a new gossip message, once settled.
pub const GOSSIP_INTERVAL: Duration = Duration::from_secs(5);

/// Delay after startup before the gossip generator starts, giving the
/// overlay time to form.
pub const GOSSIP_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Hard cap on the number of messages a single peer may originate.
pub const MAX_GOSSIP_MESSAGES: u32 = 10;

// ---------------------------------------------------------------------------
// Overlay topology
// ---------------------------------------------------------------------------

/// Minimum neighbor degree, regardless of overlay size.
pub const MIN_DEGREE: usize = 1;

/// Maximum neighbor degree, regardless of overlay size.
pub const MAX_DEGREE: usize = 5;

/// Zipf exponent used when weighting candidates during overlay construction.
pub const ZIPF_ALPHA: f64 = 1.0;

/// Bound on sampling attempts during Zipf selection, expressed as a
/// multiplier of the target degree.
pub const ZIPF_ATTEMPT_MULTIPLIER: usize = 10;

// ---------------------------------------------------------------------------
// Failure detection
// ---------------------------------------------------------------------------

/// How often a peer pings each of its neighbors.
pub const PING_INTERVAL: Duration = Duration::from_secs(3);

/// Delay after startup before the liveness detector starts.
pub const LIVENESS_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Bounded wait for a single PONG reply.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive missed pings before a neighbor becomes a suspect.
pub const SUSPICION_THRESHOLD: u32 = 3;

/// Bounded wait for a single SUSPECT_RESPONSE reply.
pub const SUSPECT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Connect timeout for best-effort peer-to-peer sends (gossip forwarding,
/// dead-node reports) that don't wait for a reply.
pub const PEER_SEND_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Consensus & sync
// ---------------------------------------------------------------------------

/// Bounded wait for a single seed's vote, per proposal.
pub const VOTE_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// How often each seed exchanges a full membership snapshot with its peers.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(15);

/// Bounded wait for a single seed's sync reply.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Bounded wait for a single seed's registration reply.
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for a single seed's `GET_PEER_LIST` reply.
pub const PEER_LIST_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Seed list config file
// ---------------------------------------------------------------------------

/// One configured seed: its bind host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSpec {
    pub host: String,
    pub port: u16,
}

/// Parses the seed config file: one seed per non-empty line, `#` starts a
/// comment, a line is either `host:port` or `host,port`. Malformed lines
/// are skipped rather than failing the whole parse.
pub fn load_seed_list(path: impl AsRef<Path>) -> std::io::Result<Vec<SeedSpec>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_seed_list(&contents))
}

/// Pure parsing logic split out from the file read so it is trivially
/// testable without touching the filesystem.
pub fn parse_seed_list(contents: &str) -> Vec<SeedSpec> {
    let mut seeds = Vec::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = if line.contains(',') {
            line.splitn(2, ',').collect()
        } else {
            line.rsplitn(2, ':').collect::<Vec<_>>().into_iter().rev().collect()
        };
        if parts.len() != 2 {
            continue;
        }
        let host = parts[0].trim().to_string();
        match parts[1].trim().parse::<u16>() {
            Ok(port) if !host.is_empty() => seeds.push(SeedSpec { host, port }),
            _ => continue,
        }
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_and_comma_forms() {
        let cfg = "127.0.0.1:6000\n127.0.0.1,6001\n# comment\n\nnot-a-line\nhost-only:\n";
        let seeds = parse_seed_list(cfg);
        assert_eq!(
            seeds,
            vec![
                SeedSpec { host: "127.0.0.1".into(), port: 6000 },
                SeedSpec { host: "127.0.0.1".into(), port: 6001 },
            ]
        );
    }

    #[test]
    fn skips_malformed_lines() {
        let cfg = "garbage\n:\n127.0.0.1:not-a-port\n127.0.0.1:6000\n";
        assert_eq!(
            parse_seed_list(cfg),
            vec![SeedSpec { host: "127.0.0.1".into(), port: 6000 }]
        );
    }

    #[test]
    fn empty_file_yields_empty_list() {
        assert!(parse_seed_list("").is_empty());
        assert!(parse_seed_list("# only comments\n\n").is_empty());
    }
}
