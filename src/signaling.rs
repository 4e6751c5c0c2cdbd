//! Relay wire protocol
//!
//! JSON text messages with a single `type` discriminant. `sdp` and
//! `candidate` are carried as opaque strings, byte for byte.

use crate::error::{Error, Result};
use crate::peer::types::PeerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    JoinRoom {
        room_id: String,
    },
    CreateRoom,
    RoomCreated {
        room_id: String,
    },
    #[serde(rename = "room_joined", alias = "joined_room")]
    RoomJoined {
        peer_id: PeerId,
    },
    PeerJoined {
        peer_id: PeerId,
    },
    #[serde(rename = "webrtc_offer")]
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        sdp: String,
    },
    #[serde(rename = "webrtc_answer")]
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        sdp: String,
    },
    #[serde(rename = "webrtc_ice_candidate")]
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<PeerId>,
        candidate: String,
    },
    Error {
        message: String,
    },
    /// Any `type` this side does not know; ignored by the dispatcher
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    /// Parse one relay message. Unknown `type` values decode to
    /// [`SignalMessage::Unknown`]; anything else that does not fit is
    /// [`Error::MalformedMessage`].
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::MalformedMessage(format!("{e}: {text}")))
    }

    pub fn to_json(&self) -> Result<String> {
        if matches!(self, SignalMessage::Unknown) {
            return Err(Error::InvalidState("cannot encode unknown message".into()));
        }
        serde_json::to_string(self).map_err(|e| Error::InvalidState(e.to_string()))
    }

    /// Wire discriminant, for logs and drop reports
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::JoinRoom { .. } => "join_room",
            SignalMessage::CreateRoom => "create_room",
            SignalMessage::RoomCreated { .. } => "room_created",
            SignalMessage::RoomJoined { .. } => "room_joined",
            SignalMessage::PeerJoined { .. } => "peer_joined",
            SignalMessage::Offer { .. } => "webrtc_offer",
            SignalMessage::Answer { .. } => "webrtc_answer",
            SignalMessage::IceCandidate { .. } => "webrtc_ice_candidate",
            SignalMessage::Error { .. } => "error",
            SignalMessage::Unknown => "unknown",
        }
    }
}
