//! Error types for the relay and the signaling roles

use crate::peer::types::PeerId;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the relay channel, the dispatcher and the roles
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Relay unreachable, handshake failed or connect timed out
    #[error("Relay connect failed: {0}")]
    Connect(String),

    /// Send/receive failure on an established relay connection
    #[error("Relay transport error: {0}")]
    Transport(String),

    /// Envelope could not be parsed or lacks required fields
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Message references a peer that is not in the table
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// `error` message sent by the relay (room full, unknown room, ...)
    #[error("Relay reported: {0}")]
    Relay(String),

    /// Outbound message dropped because the relay is down
    #[error("Relay not connected, dropped {0}")]
    RelayNotConnected(&'static str),

    /// Transport engine failure (SDP, ICE, data channel)
    #[error("Transport engine error: {0}")]
    Engine(String),

    /// Invalid configuration file or values
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Operation not allowed in the current role or state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Errors the caller should react to, e.g. by reconnecting
    pub fn is_relay_failure(&self) -> bool {
        matches!(
            self,
            Error::Connect(_) | Error::Transport(_) | Error::RelayNotConnected(_)
        )
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::Engine(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedMessage(e.to_string())
    }
}
