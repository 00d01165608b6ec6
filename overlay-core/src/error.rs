//! # Error Kinds
//!
//! Mirrors the error taxonomy a reviewer would actually hit at runtime:
//! network hiccups, malformed wire data, and the two policy "errors" that
//! are deliberately treated as idempotent successes rather than failures.

use thiserror::Error;

/// Errors surfaced by the overlay core. Most are advisory — the caller logs
/// and continues rather than aborting a connection or a consensus round.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// A TCP connect/send/recv failed. The caller should log at warning and
    /// treat the remote as unreachable for this operation only.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// A bounded wait elapsed before a reply arrived.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// A line could not be parsed as a well-formed wire record.
    #[error("malformed frame")]
    MalformedFrame,

    /// A parsed record carried a type tag with no known handler.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Attempted to insert an already-present peer, or remove an absent
    /// one. Callers treat this as an idempotent success, not a failure.
    #[error("membership conflict for {0}")]
    MembershipConflict(String),

    /// Zero `REGISTER_ACK` replies were received from any seed. Fatal for
    /// the registering peer.
    #[error("registration failed: no ACKs from any seed")]
    RegistrationFailure,

    /// The listener could not bind to its configured address.
    #[error("failed to bind listener on {0}")]
    BindFailure(String),
}
