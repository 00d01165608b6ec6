// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Overlay Core
//!
//! Core library for a gossip-based peer-to-peer overlay with an
//! authoritative, quorum-voted membership service.
//!
//! ## Architecture
//!
//! - **wire** — length-delimited JSON message framing shared by every
//!   connection kind (seed↔seed, peer↔seed, peer↔peer).
//! - **identity** — canonical `host:port` peer identifiers.
//! - **membership** — the seed's authoritative peer map.
//! - **consensus** — the register/remove proposal-and-vote state machine
//!   that is the only way membership may change.
//! - **overlay** — Zipf-weighted neighbor graph construction for peers.
//! - **gossip** — originator-bounded, hash-deduplicated message flood.
//! - **failure** — the peer-level half of the two-level failure detector
//!   (ping scheduling, suspicion, neighbor corroboration).
//! - **eventlog** — the bit-exact, spec-mandated event log format.
//! - **config** — tunables and the seed-list config file parser.
//! - **error** — the shared error taxonomy.

pub mod config;
pub mod consensus;
pub mod error;
pub mod eventlog;
pub mod failure;
pub mod gossip;
pub mod identity;
pub mod membership;
pub mod overlay;
pub mod wire;
