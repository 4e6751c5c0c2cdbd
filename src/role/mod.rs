//! Signaling roles
//!
//! A process runs exactly one participant: the [`Host`] creates a room and
//! offers to every peer that joins, the [`Client`] joins a room and answers
//! the host's offer.

pub mod client;
pub mod host;

pub use client::{Client, ClientState};
pub use host::Host;

use crate::error::Result;
use crate::events::{Events, InboundMessage};
use crate::peer::engine::DataChannel;
use crate::peer::{PeerId, PeerSession};
use crate::signaling::SignalMessage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait SignalingParticipant: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// First message to the relay once connected
    async fn start(&self) -> Result<()>;

    /// React to one parsed relay message. Types the role does not care
    /// about are accepted and ignored.
    async fn handle(&self, msg: SignalMessage) -> Result<()>;

    /// Called after every (re)connect of the relay
    async fn on_relay_connected(&self) {}

    /// Close every peer session
    async fn shutdown(&self);
}

/// Forward a session's data channel events to the application hubs
pub(crate) fn surface_channel(
    session: &Arc<PeerSession>,
    dc: &Arc<dyn DataChannel>,
    events: &Arc<Events>,
) {
    let peer_id = session.peer_id().clone();
    let label = dc.label();

    {
        let events = events.clone();
        let peer_id = peer_id.clone();
        let label = label.clone();
        let session = Arc::downgrade(session);
        dc.on_open(Arc::new(move || {
            info!("Data channel '{}' open with {}", label, peer_id);
            if let Some(session) = session.upgrade() {
                session.candidate_summary().report();
            }
            events.channel_open.emit(&peer_id);
        }));
    }
    {
        let events = events.clone();
        let peer_id = peer_id.clone();
        dc.on_message(Arc::new(move |data| {
            events.message.emit(&InboundMessage {
                peer_id: peer_id.clone(),
                data,
            });
        }));
    }
    dc.on_close(Arc::new(move || {
        info!("Data channel '{}' with {} closed", label, peer_id);
    }));
}

fn ice_message(peer_id: &PeerId, candidate: &str) -> SignalMessage {
    SignalMessage::IceCandidate {
        peer_id: Some(peer_id.clone()),
        candidate: candidate.to_string(),
    }
}
