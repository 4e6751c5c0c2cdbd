pub mod connection;
pub mod data_channel;
pub mod engine;
pub mod ice;
pub mod state;
pub mod table;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::WebRtcEngine;
pub use engine::{DataChannel, EngineSession, TransportEngine};
pub use state::{PeerInfo, PeerSession};
pub use table::PeerTable;
pub use types::{ChannelState, PeerId, Role, SdpKind, ServerConfig, SessionDescription};
