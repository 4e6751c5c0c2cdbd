//! Responder role: joins a room and answers the host's offer

use super::{ice_message, surface_channel, SignalingParticipant};
use crate::dispatcher::Signaler;
use crate::error::{Error, Result};
use crate::events::Events;
use crate::peer::engine::TransportEngine;
use crate::peer::{PeerId, PeerSession, Role, SessionDescription};
use crate::signaling::SignalMessage;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered: the client only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    Idle,
    Joining,
    Joined,
    Negotiating,
    Open,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Idle => "idle",
            ClientState::Joining => "joining",
            ClientState::Joined => "joined",
            ClientState::Negotiating => "negotiating",
            ClientState::Open => "open",
        };
        f.write_str(s)
    }
}

fn advance(state: &Mutex<ClientState>, to: ClientState) {
    let mut state = state.lock();
    if *state < to {
        debug!("Client state {} -> {}", *state, to);
        *state = to;
    }
}

pub struct Client {
    signaler: Signaler,
    engine: Arc<dyn TransportEngine>,
    events: Arc<Events>,
    room_id: String,
    state: Arc<Mutex<ClientState>>,
    session: Mutex<Option<Arc<PeerSession>>>,
}

impl Client {
    pub fn new(
        signaler: Signaler,
        engine: Arc<dyn TransportEngine>,
        events: Arc<Events>,
        room_id: impl Into<String>,
    ) -> Self {
        Self {
            signaler,
            engine,
            events,
            room_id: room_id.into(),
            state: Arc::new(Mutex::new(ClientState::Idle)),
            session: Mutex::new(None),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    /// The room's host, once joined
    pub fn host_id(&self) -> Option<PeerId> {
        self.session().map(|s| s.peer_id().clone())
    }

    pub fn session(&self) -> Option<Arc<PeerSession>> {
        self.session.lock().clone()
    }

    /// Send to the host; `Ok(false)` until the data channel is open
    pub async fn send_text(&self, data: Bytes) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        session.send(&data).await
    }

    async fn on_room_joined(&self, peer_id: PeerId) -> Result<()> {
        if self.session.lock().is_some() {
            debug!("Already joined, ignoring room_joined for {}", peer_id);
            return Ok(());
        }

        let transport = self.engine.create_session().await?;
        let session = PeerSession::new(peer_id.clone(), Role::Answerer, transport.clone());

        {
            let signaler = self.signaler.clone();
            let peer_id = peer_id.clone();
            // no buffering on this side: a candidate that cannot go out is dropped
            transport.on_local_candidate(Arc::new(move |candidate| {
                let _ = signaler.send(&ice_message(&peer_id, &candidate));
            }));
        }
        {
            let events = self.events.clone();
            let state = self.state.clone();
            let weak = Arc::downgrade(&session);
            transport.on_remote_channel(Arc::new(move |dc| {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                info!("Data channel '{}' received from {}", dc.label(), session.peer_id());
                surface_channel(&session, &dc, &events);
                let state = state.clone();
                dc.on_open(Arc::new(move || advance(&state, ClientState::Open)));
                session.set_channel(dc);
            }));
        }

        *self.session.lock() = Some(session);
        advance(&self.state, ClientState::Joined);
        info!("Joined room {}, host is {}", self.room_id, peer_id);
        self.events.room_joined.emit(&peer_id);
        Ok(())
    }

    async fn on_offer(&self, sdp: String) -> Result<()> {
        let Some(session) = self.session() else {
            debug!("Offer before room_joined, ignoring");
            return Ok(());
        };

        let drained = session
            .apply_remote_description(SessionDescription::offer(sdp))
            .await?;
        debug!("Offer applied, {} pending candidates", drained);

        let transport = session.transport();
        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        advance(&self.state, ClientState::Negotiating);

        info!("Sending answer to {}", session.peer_id());
        self.signaler.send(&SignalMessage::Answer {
            room_id: Some(self.room_id.clone()),
            peer_id: Some(session.peer_id().clone()),
            sdp: answer.sdp,
        })
    }

    async fn on_ice_candidate(&self, candidate: String) -> Result<()> {
        let Some(session) = self.session() else {
            debug!("Candidate before room_joined, ignoring");
            return Ok(());
        };
        session.add_remote_candidate(candidate).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalingParticipant for Client {
    fn name(&self) -> &'static str {
        "client"
    }

    async fn start(&self) -> Result<()> {
        info!("Joining room {}", self.room_id);
        self.signaler.send(&SignalMessage::JoinRoom {
            room_id: self.room_id.clone(),
        })?;
        advance(&self.state, ClientState::Joining);
        Ok(())
    }

    async fn handle(&self, msg: SignalMessage) -> Result<()> {
        match msg {
            SignalMessage::RoomJoined { peer_id } => self.on_room_joined(peer_id).await,
            SignalMessage::Offer { sdp, .. } => self.on_offer(sdp).await,
            SignalMessage::IceCandidate { candidate, .. } => self.on_ice_candidate(candidate).await,
            SignalMessage::Error { message } => {
                warn!("Relay error: {}", message);
                self.events.errors.emit(&Error::Relay(message));
                Ok(())
            }
            other => {
                debug!("Client ignores {}", other.kind());
                Ok(())
            }
        }
    }

    async fn shutdown(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await;
            info!("Client closed session with {}", session.peer_id());
        }
    }
}
