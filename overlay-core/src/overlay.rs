//! # Zipf-Weighted Overlay Construction
//!
//! Every peer knows the full membership (via `GET_PEER_LIST`/`PEER_LIST`
//! from the seeds it's registered with) but only gossips to a small
//! neighbor subset, the "overlay". The subset is chosen so that a few
//! peers end up with disproportionately many neighbors and most end up
//! with few — a power-law degree distribution — by ranking candidates
//! randomly and then drawing from a Zipf(`α`) distribution over rank.
//!
//! The target degree itself scales gently with network size:
//! `clamp(log2(n + 1) + 1, min_degree, max_degree)`, capped at `n` once the
//! network is smaller than `min_degree`.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config;
use crate::membership::PeerEntry;

/// Computes the target neighbor count for a network of `n` known peers.
pub fn target_degree(n: usize, min_degree: usize, max_degree: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let log_term = ((n + 1) as f64).log2() as usize + 1;
    let target = log_term.clamp(min_degree, max_degree);
    target.min(n)
}

/// Builds a Zipf-weighted neighbor subset of `available`, excluding
/// `exclude_id` (the caller's own id). Weight for rank `i` (0-indexed,
/// after shuffling candidate order) is `1 / (i + 1)^alpha`.
///
/// Selection draws with replacement against the cumulative distribution
/// until `target` distinct ids are chosen or the attempt budget
/// (`target * attempt_multiplier`) is exhausted — a network with very few
/// peers relative to the target degree may therefore return fewer than
/// `target` neighbors.
pub fn build_overlay(
    available: &HashMap<String, PeerEntry>,
    exclude_id: &str,
    min_degree: usize,
    max_degree: usize,
) -> HashMap<String, PeerEntry> {
    build_overlay_with_rng(
        available,
        exclude_id,
        min_degree,
        max_degree,
        config::ZIPF_ALPHA,
        config::ZIPF_ATTEMPT_MULTIPLIER,
        &mut rand::thread_rng(),
    )
}

fn build_overlay_with_rng(
    available: &HashMap<String, PeerEntry>,
    exclude_id: &str,
    min_degree: usize,
    max_degree: usize,
    alpha: f64,
    attempt_multiplier: usize,
    rng: &mut impl Rng,
) -> HashMap<String, PeerEntry> {
    let mut ids: Vec<&String> = available.keys().filter(|id| id.as_str() != exclude_id).collect();
    if ids.is_empty() {
        return HashMap::new();
    }
    ids.shuffle(rng);

    let n = ids.len();
    let target = target_degree(n, min_degree, max_degree);

    let weights: Vec<f64> = (0..n).map(|i| 1.0 / ((i + 1) as f64).powf(alpha)).collect();
    let total_weight: f64 = weights.iter().sum();
    let probs: Vec<f64> = weights.iter().map(|w| w / total_weight).collect();

    let mut selected = std::collections::HashSet::new();
    let mut attempts = 0;
    let attempt_budget = target * attempt_multiplier;
    while selected.len() < target && attempts < attempt_budget {
        let r: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (i, p) in probs.iter().enumerate() {
            cumulative += p;
            if r <= cumulative {
                selected.insert(ids[i].clone());
                break;
            }
        }
        attempts += 1;
    }

    selected
        .into_iter()
        .filter_map(|id| available.get(&id).map(|entry| (id, entry.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn peers(n: usize) -> HashMap<String, PeerEntry> {
        (0..n)
            .map(|i| {
                (
                    format!("127.0.0.1:{}", 7000 + i),
                    PeerEntry { host: "127.0.0.1".into(), port: 7000 + i as u16, joined_at: 0.0 },
                )
            })
            .collect()
    }

    #[test]
    fn target_degree_scales_with_log2_and_clamps() {
        assert_eq!(target_degree(0, 2, 6), 0);
        assert_eq!(target_degree(1, 2, 6), 1);
        assert_eq!(target_degree(3, 2, 6), 3);
        assert_eq!(target_degree(1000, 2, 6), 6);
    }

    #[test]
    fn excludes_self_and_never_exceeds_available() {
        let available = peers(3);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let overlay = build_overlay_with_rng(&available, "127.0.0.1:7000", 2, 6, 1.0, 10, &mut rng);
        assert!(!overlay.contains_key("127.0.0.1:7000"));
        assert!(overlay.len() <= 2);
    }

    #[test]
    fn empty_network_yields_empty_overlay() {
        let available = HashMap::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let overlay = build_overlay_with_rng(&available, "x:1", 2, 6, 1.0, 10, &mut rng);
        assert!(overlay.is_empty());
    }

    #[test]
    fn single_other_peer_yields_exactly_one_neighbor() {
        let available = peers(2);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let overlay = build_overlay_with_rng(&available, "127.0.0.1:7000", 2, 6, 1.0, 50, &mut rng);
        assert_eq!(overlay.len(), 1);
        assert!(overlay.contains_key("127.0.0.1:7001"));
    }
}
