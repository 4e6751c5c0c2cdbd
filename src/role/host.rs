//! Initiator role: owns the room and one offerer session per joined peer

use super::{ice_message, surface_channel, SignalingParticipant};
use crate::dispatcher::Signaler;
use crate::error::{Error, Result};
use crate::events::Events;
use crate::peer::engine::TransportEngine;
use crate::peer::{PeerId, PeerInfo, PeerSession, PeerTable, Role, SessionDescription};
use crate::signaling::SignalMessage;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Host {
    signaler: Signaler,
    engine: Arc<dyn TransportEngine>,
    events: Arc<Events>,
    channel_label: String,
    room_id: Mutex<Option<String>>,
    peers: PeerTable,
}

impl Host {
    pub fn new(
        signaler: Signaler,
        engine: Arc<dyn TransportEngine>,
        events: Arc<Events>,
        channel_label: impl Into<String>,
    ) -> Self {
        Self {
            signaler,
            engine,
            events,
            channel_label: channel_label.into(),
            room_id: Mutex::new(None),
            peers: PeerTable::new(),
        }
    }

    pub fn room_id(&self) -> Option<String> {
        self.room_id.lock().clone()
    }

    pub fn create_room(&self) -> Result<()> {
        info!("Creating room");
        self.signaler.send(&SignalMessage::CreateRoom)
    }

    pub fn session(&self, peer_id: &PeerId) -> Option<Arc<PeerSession>> {
        self.peers.get(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Snapshot of every peer session, sorted by id
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers
            .ids()
            .into_iter()
            .filter_map(|id| self.peers.get(&id).map(|s| s.info()))
            .collect()
    }

    /// Send to one peer; `Ok(false)` for an unknown peer or a channel that is
    /// not open.
    pub async fn send_to_peer(&self, peer_id: &PeerId, data: Bytes) -> Result<bool> {
        let Some(session) = self.peers.get(peer_id) else {
            debug!("send_to_peer: unknown peer {}", peer_id);
            return Ok(false);
        };
        session.send(&data).await
    }

    /// Send to every peer with an open channel. A failing peer does not
    /// affect the others. Returns how many peers the data went to.
    pub async fn broadcast(&self, data: Bytes) -> usize {
        if self.peers.is_empty() {
            debug!("Broadcast with no peers");
            return 0;
        }
        let mut delivered = 0;
        for session in self.peers.sessions() {
            match session.send(&data).await {
                Ok(true) => delivered += 1,
                Ok(false) => debug!(
                    "Skipping {} (channel {})",
                    session.peer_id(),
                    session.channel_state()
                ),
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", session.peer_id(), e);
                    self.events.errors.emit(&e);
                }
            }
        }
        delivered
    }

    /// Close and forget one peer session
    pub async fn remove_peer(&self, peer_id: &PeerId) -> bool {
        match self.peers.remove(peer_id) {
            Some(session) => {
                info!("Removing peer {}", peer_id);
                session.close().await;
                true
            }
            None => false,
        }
    }

    fn on_room_created(&self, room_id: String) {
        info!("Room created: {}", room_id);
        *self.room_id.lock() = Some(room_id.clone());
        self.events.room_created.emit(&room_id);
    }

    async fn on_peer_joined(&self, peer_id: PeerId) -> Result<()> {
        if self.peers.contains(&peer_id) {
            warn!("Peer {} joined twice, keeping the existing session", peer_id);
            return Ok(());
        }

        let transport = self.engine.create_session().await?;
        let session = PeerSession::new(peer_id.clone(), Role::Offerer, transport.clone());
        if !self.peers.insert(session.clone()) {
            warn!("Peer {} joined twice, keeping the existing session", peer_id);
            if let Err(e) = transport.close().await {
                debug!("Closing duplicate transport for {}: {}", peer_id, e);
            }
            return Ok(());
        }

        info!(
            "Peer joined: {} at {}",
            peer_id,
            session.created_at().format("%H:%M:%S%.3f")
        );
        self.events.peer_joined.emit(&peer_id);

        if let Err(e) = self.offer(&session).await {
            self.peers.remove(&peer_id);
            session.close().await;
            return Err(e);
        }
        Ok(())
    }

    async fn offer(&self, session: &Arc<PeerSession>) -> Result<()> {
        let peer_id = session.peer_id().clone();
        let transport = session.transport().clone();

        {
            let signaler = self.signaler.clone();
            let session = Arc::downgrade(session);
            transport.on_local_candidate(Arc::new(move |candidate| {
                let Some(session) = session.upgrade() else {
                    return;
                };
                let peer_id = session.peer_id().clone();
                session.push_local_candidate(candidate, |c| {
                    signaler.try_send(&ice_message(&peer_id, c))
                });
            }));
        }

        let dc = transport.create_data_channel(&self.channel_label).await?;
        surface_channel(session, &dc, &self.events);
        session.set_channel(dc);

        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;

        info!("Sending offer to {}", peer_id);
        self.signaler.send(&SignalMessage::Offer {
            peer_id: Some(peer_id.clone()),
            sdp: offer.sdp,
        })?;

        // candidates gathered while the offer was being built go out after it
        let flushed =
            session.flush_outbound(|c| self.signaler.try_send(&ice_message(&peer_id, c)));
        if flushed > 0 {
            debug!("Sent {} buffered candidates to {}", flushed, peer_id);
        }
        Ok(())
    }

    async fn on_answer(&self, peer_id: Option<PeerId>, sdp: String) -> Result<()> {
        let peer_id = peer_id
            .ok_or_else(|| Error::MalformedMessage("webrtc_answer without peer_id".into()))?;
        let session = self
            .peers
            .get(&peer_id)
            .ok_or_else(|| Error::UnknownPeer(peer_id.clone()))?;

        let drained = session
            .apply_remote_description(SessionDescription::answer(sdp))
            .await?;
        info!("Answer from {} applied, {} pending candidates", peer_id, drained);
        Ok(())
    }

    async fn on_ice_candidate(&self, peer_id: Option<PeerId>, candidate: String) -> Result<()> {
        let peer_id = peer_id.ok_or_else(|| {
            Error::MalformedMessage("webrtc_ice_candidate without peer_id".into())
        })?;
        let session = self
            .peers
            .get(&peer_id)
            .ok_or_else(|| Error::UnknownPeer(peer_id.clone()))?;

        session.add_remote_candidate(candidate).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalingParticipant for Host {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn start(&self) -> Result<()> {
        self.create_room()
    }

    async fn handle(&self, msg: SignalMessage) -> Result<()> {
        match msg {
            SignalMessage::RoomCreated { room_id } => {
                self.on_room_created(room_id);
                Ok(())
            }
            SignalMessage::PeerJoined { peer_id } => self.on_peer_joined(peer_id).await,
            SignalMessage::Answer { peer_id, sdp, .. } => self.on_answer(peer_id, sdp).await,
            SignalMessage::IceCandidate { peer_id, candidate } => {
                self.on_ice_candidate(peer_id, candidate).await
            }
            SignalMessage::Error { message } => {
                warn!("Relay error: {}", message);
                self.events.errors.emit(&Error::Relay(message));
                Ok(())
            }
            other => {
                debug!("Host ignores {}", other.kind());
                Ok(())
            }
        }
    }

    async fn on_relay_connected(&self) {
        for session in self.peers.sessions() {
            let peer_id = session.peer_id().clone();
            let sent =
                session.resume_outbound(|c| self.signaler.try_send(&ice_message(&peer_id, c)));
            if sent > 0 {
                info!("Resent {} buffered candidates to {}", sent, peer_id);
            }
            let left = session.pending_outbound_len();
            if left > 0 {
                debug!("{} candidates for {} still held", left, peer_id);
            }
        }
    }

    async fn shutdown(&self) {
        for session in self.peers.drain() {
            session.close().await;
        }
        info!("Host closed all peer sessions");
    }
}
