//! Relay-signaled WebRTC data-channel sessions
//!
//! A host creates a room on a websocket relay and negotiates one data
//! channel per peer that joins; clients join a room and answer. Relay
//! messages are sequenced onto a transport engine so that no remote ICE
//! candidate is applied before its session description.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logger;
pub mod peer;
pub mod relay;
pub mod role;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventHub, Events, InboundMessage};
pub use peer::{ChannelState, PeerId, PeerInfo, WebRtcEngine};
pub use relay::{DisconnectReason, RelayChannel};
pub use role::ClientState;
pub use session::{ActiveRole, SignalingNode};
pub use signaling::SignalMessage;
