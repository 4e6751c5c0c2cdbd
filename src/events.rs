//! Multicast event subscription
//!
//! Each event kind owns an ordered list of subscriber callbacks. Emitting an
//! event invokes every subscriber in registration order on the caller's task,
//! so subscribers must be quick and must not block; heavy work belongs in a
//! task fed through a channel.

use crate::error::Error;
use crate::peer::types::PeerId;
use crate::relay::DisconnectReason;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered list of subscribers for one event kind
pub struct EventHub<T> {
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Arc::new(f));
    }

    /// Invoke all subscribers in registration order
    pub fn emit(&self, event: &T) {
        // snapshot so a subscriber may subscribe more handlers without deadlocking
        let subscribers = self.subscribers.lock().clone();
        for s in subscribers {
            s(event);
        }
    }
}

/// Application data received on a peer data channel
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub peer_id: PeerId,
    pub data: Bytes,
}

impl InboundMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Events surfaced to the application by a running role
#[derive(Default)]
pub struct Events {
    pub room_created: EventHub<String>,
    pub room_joined: EventHub<PeerId>,
    pub peer_joined: EventHub<PeerId>,
    pub channel_open: EventHub<PeerId>,
    pub message: EventHub<InboundMessage>,
    pub relay_connected: EventHub<()>,
    pub relay_disconnected: EventHub<DisconnectReason>,
    /// Relay `error` messages, dropped sends, parse and engine failures
    pub errors: EventHub<Error>,
}

impl Events {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}
