//! Process-level entry point
//!
//! A [`SignalingNode`] wires one relay channel, one dispatcher and exactly
//! one role together. Build it, subscribe to [`SignalingNode::events`], then
//! [`SignalingNode::start`]; or use the `start_*` shortcuts when nothing
//! needs to be observed before the first relay message.

use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherHandle, Signaler};
use crate::error::{Error, Result};
use crate::events::Events;
use crate::peer::engine::TransportEngine;
use crate::peer::{PeerId, PeerInfo};
use crate::relay::RelayChannel;
use crate::role::{Client, ClientState, Host, SignalingParticipant};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub enum ActiveRole {
    Host(Arc<Host>),
    Client(Arc<Client>),
}

impl ActiveRole {
    fn participant(&self) -> Arc<dyn SignalingParticipant> {
        match self {
            ActiveRole::Host(h) => h.clone(),
            ActiveRole::Client(c) => c.clone(),
        }
    }
}

pub struct SignalingNode {
    config: Config,
    relay: Arc<RelayChannel>,
    events: Arc<Events>,
    role: ActiveRole,
    dispatcher: Mutex<Option<DispatcherHandle>>,
}

impl SignalingNode {
    /// Initiator, not yet connected
    pub fn initiator(config: Config, engine: Arc<dyn TransportEngine>) -> Self {
        Self::build(config, |signaler, events, config| {
            ActiveRole::Host(Arc::new(Host::new(
                signaler,
                engine,
                events,
                config.data_channel_label.clone(),
            )))
        })
    }

    /// Responder for `room_id`, not yet connected
    pub fn responder(
        config: Config,
        engine: Arc<dyn TransportEngine>,
        room_id: impl Into<String>,
    ) -> Self {
        let room_id = room_id.into();
        Self::build(config, |signaler, events, _| {
            ActiveRole::Client(Arc::new(Client::new(signaler, engine, events, room_id)))
        })
    }

    fn build<F>(config: Config, make_role: F) -> Self
    where
        F: FnOnce(Signaler, Arc<Events>, &Config) -> ActiveRole,
    {
        let events = Events::new();
        let relay = Arc::new(RelayChannel::new(config.connect_timeout()));
        let signaler = Signaler::new(relay.clone(), events.clone());
        let role = make_role(signaler, events.clone(), &config);
        Self {
            config,
            relay,
            events,
            role,
            dispatcher: Mutex::new(None),
        }
    }

    pub async fn start_initiator(config: Config, engine: Arc<dyn TransportEngine>) -> Result<Self> {
        let node = Self::initiator(config, engine);
        node.start().await?;
        Ok(node)
    }

    pub async fn start_responder(
        config: Config,
        engine: Arc<dyn TransportEngine>,
        room_id: impl Into<String>,
    ) -> Result<Self> {
        let node = Self::responder(config, engine, room_id);
        node.start().await?;
        Ok(node)
    }

    /// Connect to the relay and send the role's opening message
    /// (`create_room` or `join_room`)
    pub async fn start(&self) -> Result<()> {
        {
            let mut dispatcher = self.dispatcher.lock();
            if dispatcher.is_some() {
                return Err(Error::InvalidState("node already started".into()));
            }
            let participant = self.role.participant();
            *dispatcher = Some(
                Dispatcher::new(participant, self.events.clone()).spawn(self.relay.events()),
            );
        }

        if let Err(e) = self.relay.connect(&self.config.relay_url).await {
            let dispatcher = self.dispatcher.lock().take();
            if let Some(dispatcher) = dispatcher {
                dispatcher.stop().await;
            }
            return Err(e);
        }
        self.role.participant().start().await
    }

    /// Reconnect after the relay went away. Messages dropped in the meantime
    /// are not replayed; only the host's buffered candidates go out.
    pub async fn reconnect(&self) -> Result<()> {
        if self.dispatcher.lock().is_none() {
            return Err(Error::InvalidState("node not started".into()));
        }
        self.relay.connect(&self.config.relay_url).await
    }

    pub fn events(&self) -> &Arc<Events> {
        &self.events
    }

    pub fn role(&self) -> &ActiveRole {
        &self.role
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.relay.is_connected()
    }

    /// Host: every open peer. Client: the host, if the channel is open.
    /// Returns how many peers the text went to.
    pub async fn broadcast(&self, text: &str) -> Result<usize> {
        let data = Bytes::copy_from_slice(text.as_bytes());
        match &self.role {
            ActiveRole::Host(host) => Ok(host.broadcast(data).await),
            ActiveRole::Client(client) => Ok(usize::from(client.send_text(data).await?)),
        }
    }

    /// `Ok(false)` when the peer is unknown or its channel is not open
    pub async fn send_to_peer(&self, peer_id: &PeerId, text: &str) -> Result<bool> {
        let data = Bytes::copy_from_slice(text.as_bytes());
        match &self.role {
            ActiveRole::Host(host) => host.send_to_peer(peer_id, data).await,
            ActiveRole::Client(client) => {
                if client.host_id().as_ref() != Some(peer_id) {
                    return Ok(false);
                }
                client.send_text(data).await
            }
        }
    }

    /// Host: every peer session. Client: the host, if joined.
    pub fn peers(&self) -> Vec<PeerInfo> {
        match &self.role {
            ActiveRole::Host(host) => host.peers(),
            ActiveRole::Client(client) => client
                .session()
                .map(|s| vec![s.info()])
                .unwrap_or_default(),
        }
    }

    pub fn room_id(&self) -> Option<String> {
        match &self.role {
            ActiveRole::Host(host) => host.room_id(),
            ActiveRole::Client(client) => Some(client.room_id().to_string()),
        }
    }

    pub fn client_state(&self) -> Option<ClientState> {
        match &self.role {
            ActiveRole::Host(_) => None,
            ActiveRole::Client(client) => Some(client.state()),
        }
    }

    /// Close the relay, drain the dispatcher, then close every peer session
    ///
    /// Sessions created by messages still queued at shutdown are closed too.
    pub async fn shutdown(&self) {
        let participant = self.role.participant();
        info!("Shutting down {}", participant.name());
        self.relay.disconnect().await;
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.stop().await;
        }
        participant.shutdown().await;
    }
}

impl Drop for SignalingNode {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.lock().as_ref() {
            dispatcher.abort();
        }
    }
}
