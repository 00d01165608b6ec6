//! # Wire Codec & Framing
//!
//! Every message on every connection is a self-describing record with a
//! type tag, a sender timestamp (informational only), and a typed payload.
//! Records are serialized as a single line of UTF-8 JSON terminated by a
//! newline — `serde_json` never emits a raw newline inside a compact
//! object, so the delimiter is unambiguous.
//!
//! Readers accumulate bytes into a buffer; every complete line is parsed
//! and dispatched, and a line that doesn't decode into a recognized
//! message is dropped rather than aborting the connection (`MalformedFrame`
//! / `UnknownMessageType`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::OverlayError;
use crate::membership::PeerEntry;

/// The raw on-wire envelope: type tag, informational timestamp, payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    type_tag: String,
    timestamp: f64,
    #[serde(default)]
    payload: Value,
}

/// A decoded, typed message. Construct a variant directly and call
/// [`Message::encode`] to get wire bytes; parse incoming bytes with
/// [`decode_frames`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    RegisterRequest(RegisterRequestPayload),
    RegisterAck(RegisterAckPayload),
    RegisterNack(RegisterAckPayload),
    GetPeerList,
    PeerList(PeerListPayload),
    DeadNodeReport(DeadNodeReportPayload),
    ProposeRegister(ProposeRegisterPayload),
    VoteRegister(VotePayload),
    ProposeRemove(ProposeRemovePayload),
    VoteRemove(VotePayload),
    SeedSync(SeedSyncPayload),
    Gossip(GossipPayload),
    Ping(PingPongPayload),
    Pong(PingPongPayload),
    SuspectQuery(SuspectQueryPayload),
    SuspectResponse(SuspectResponsePayload),
}

impl Message {
    fn type_tag(&self) -> &'static str {
        match self {
            Message::RegisterRequest(_) => "REGISTER_REQUEST",
            Message::RegisterAck(_) => "REGISTER_ACK",
            Message::RegisterNack(_) => "REGISTER_NACK",
            Message::GetPeerList => "GET_PEER_LIST",
            Message::PeerList(_) => "PEER_LIST",
            Message::DeadNodeReport(_) => "DEAD_NODE_REPORT",
            Message::ProposeRegister(_) => "PROPOSE_REGISTER",
            Message::VoteRegister(_) => "VOTE_REGISTER",
            Message::ProposeRemove(_) => "PROPOSE_REMOVE",
            Message::VoteRemove(_) => "VOTE_REMOVE",
            Message::SeedSync(_) => "SEED_SYNC",
            Message::Gossip(_) => "GOSSIP",
            Message::Ping(_) => "PING",
            Message::Pong(_) => "PONG",
            Message::SuspectQuery(_) => "SUSPECT_QUERY",
            Message::SuspectResponse(_) => "SUSPECT_RESPONSE",
        }
    }

    fn payload_value(&self) -> Value {
        match self {
            Message::RegisterRequest(p) => serde_json::to_value(p),
            Message::RegisterAck(p) | Message::RegisterNack(p) => serde_json::to_value(p),
            Message::GetPeerList => Ok(Value::Object(Default::default())),
            Message::PeerList(p) => serde_json::to_value(p),
            Message::DeadNodeReport(p) => serde_json::to_value(p),
            Message::ProposeRegister(p) => serde_json::to_value(p),
            Message::VoteRegister(p) | Message::VoteRemove(p) => serde_json::to_value(p),
            Message::ProposeRemove(p) => serde_json::to_value(p),
            Message::SeedSync(p) => serde_json::to_value(p),
            Message::Gossip(p) => serde_json::to_value(p),
            Message::Ping(p) | Message::Pong(p) => serde_json::to_value(p),
            Message::SuspectQuery(p) => serde_json::to_value(p),
            Message::SuspectResponse(p) => serde_json::to_value(p),
        }
        .expect("payload serialization cannot fail")
    }

    /// Serializes this message to a single newline-terminated line.
    pub fn encode(&self, timestamp: f64) -> Vec<u8> {
        let frame = Frame { type_tag: self.type_tag().to_string(), timestamp, payload: self.payload_value() };
        let mut bytes = serde_json::to_vec(&frame).expect("frame serialization cannot fail");
        bytes.push(b'\n');
        bytes
    }

    fn from_frame(frame: Frame) -> Result<Message, OverlayError> {
        fn decode<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, OverlayError> {
            serde_json::from_value(payload).map_err(|_| OverlayError::MalformedFrame)
        }

        match frame.type_tag.as_str() {
            "REGISTER_REQUEST" => decode(frame.payload).map(Message::RegisterRequest),
            "REGISTER_ACK" => decode(frame.payload).map(Message::RegisterAck),
            "REGISTER_NACK" => decode(frame.payload).map(Message::RegisterNack),
            "GET_PEER_LIST" => Ok(Message::GetPeerList),
            "PEER_LIST" => decode(frame.payload).map(Message::PeerList),
            "DEAD_NODE_REPORT" => decode(frame.payload).map(Message::DeadNodeReport),
            "PROPOSE_REGISTER" => decode(frame.payload).map(Message::ProposeRegister),
            "VOTE_REGISTER" => decode(frame.payload).map(Message::VoteRegister),
            "PROPOSE_REMOVE" => decode(frame.payload).map(Message::ProposeRemove),
            "VOTE_REMOVE" => decode(frame.payload).map(Message::VoteRemove),
            "SEED_SYNC" => decode(frame.payload).map(Message::SeedSync),
            "GOSSIP" => decode(frame.payload).map(Message::Gossip),
            "PING" => decode(frame.payload).map(Message::Ping),
            "PONG" => decode(frame.payload).map(Message::Pong),
            "SUSPECT_QUERY" => decode(frame.payload).map(Message::SuspectQuery),
            "SUSPECT_RESPONSE" => decode(frame.payload).map(Message::SuspectResponse),
            other => Err(OverlayError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Parses as many complete newline-terminated records as `buf` holds.
/// Returns the decoded messages (malformed or unrecognized lines are
/// silently dropped, per §4.1) and leaves any trailing partial record in
/// `buf` for the next read.
pub fn decode_frames(buf: &mut Vec<u8>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let line = &line[..line.len() - 1];
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match serde_json::from_slice::<Frame>(line) {
            Ok(frame) => {
                if let Ok(msg) = Message::from_frame(frame) {
                    messages.push(msg);
                }
            }
            Err(_) => continue,
        }
    }
    messages
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequestPayload {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAckPayload {
    pub peer_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerListPayload {
    pub peers: HashMap<String, PeerEntry>,
    pub seed_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadNodeReportPayload {
    pub dead_peer_id: String,
    pub reporter_id: String,
    pub peer_votes: u32,
    pub timestamp: f64,
    pub report_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeRegisterPayload {
    pub proposal_id: String,
    pub peer_host: String,
    pub peer_port: u16,
    pub peer_id: String,
    pub proposer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposeRemovePayload {
    pub proposal_id: String,
    pub peer_id: String,
    pub reporter: String,
    pub peer_votes: u32,
    pub proposer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotePayload {
    pub proposal_id: String,
    pub voter: String,
    pub vote: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSyncPayload {
    pub peers: HashMap<String, PeerEntry>,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipPayload {
    pub msg_id: String,
    pub msg_hash: String,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPongPayload {
    pub sender: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectQueryPayload {
    pub sender: String,
    pub suspect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectResponsePayload {
    pub sender: String,
    pub suspect: String,
    pub confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_typed_message() {
        let msg = Message::Ping(PingPongPayload { sender: "a:1".into(), timestamp: 1.0 });
        let mut bytes = msg.encode(1.0);
        assert_eq!(bytes.last(), Some(&b'\n'));
        let decoded = decode_frames(&mut bytes);
        assert_eq!(decoded, vec![msg]);
        assert!(bytes.is_empty());
    }

    #[test]
    fn unit_variant_round_trips() {
        let msg = Message::GetPeerList;
        let mut bytes = msg.encode(0.0);
        assert_eq!(decode_frames(&mut bytes), vec![msg]);
    }

    #[test]
    fn drops_malformed_lines_without_aborting() {
        let mut buf = b"not json\n{\"type\":\"GOSSIP\",\"timestamp\":1.0,\"payload\":{\"msg_id\":\"m\",\"msg_hash\":\"h\",\"sender\":\"s\"}}\n".to_vec();
        let decoded = decode_frames(&mut buf);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn unknown_type_is_dropped() {
        let mut buf = b"{\"type\":\"NOT_A_TYPE\",\"timestamp\":1.0,\"payload\":{}}\n".to_vec();
        assert!(decode_frames(&mut buf).is_empty());
    }

    #[test]
    fn leaves_partial_record_in_buffer() {
        let mut buf = b"{\"type\":\"GET_PEER_LIST\",\"timestamp\":0.0,\"payload\":{}}\n{\"type\":\"GET".to_vec();
        let decoded = decode_frames(&mut buf);
        assert_eq!(decoded, vec![Message::GetPeerList]);
        assert_eq!(buf, b"{\"type\":\"GET");
    }
}
