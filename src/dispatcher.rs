//! Parse relay messages and route them to the active role
//!
//! Relay events are pushed into an unbounded queue and drained by a single
//! task, so the socket read loop never waits on negotiation and messages are
//! handled strictly in arrival order.

use crate::error::{Error, Result};
use crate::events::Events;
use crate::relay::{DisconnectReason, RelayEvents};
use crate::role::SignalingParticipant;
use crate::signaling::SignalMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Anything that can carry whole text messages to the relay
pub trait RelaySink: Send + Sync {
    fn is_connected(&self) -> bool;
    fn send_text(&self, text: String) -> Result<()>;
}

/// Connection-guarded sender shared by the roles and their engine callbacks
///
/// Nothing is queued while the relay is down: the message is dropped and the
/// caller gets [`Error::RelayNotConnected`].
#[derive(Clone)]
pub struct Signaler {
    sink: Arc<dyn RelaySink>,
    events: Arc<Events>,
}

impl Signaler {
    pub fn new(sink: Arc<dyn RelaySink>, events: Arc<Events>) -> Self {
        Self { sink, events }
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    /// Send, and report a drop on the `errors` hub
    pub fn send(&self, msg: &SignalMessage) -> Result<()> {
        self.try_send(msg).inspect_err(|e| {
            warn!("Dropped {}: {}", msg.kind(), e);
            self.events.errors.emit(e);
        })
    }

    /// Send without reporting; for callers that keep the message themselves
    pub fn try_send(&self, msg: &SignalMessage) -> Result<()> {
        if !self.sink.is_connected() {
            return Err(Error::RelayNotConnected(msg.kind()));
        }
        let text = msg.to_json()?;
        debug!("Relay ← {}", msg.kind());
        self.sink.send_text(text).map_err(|e| match e {
            Error::RelayNotConnected(_) => Error::RelayNotConnected(msg.kind()),
            other => other,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected,
    Message(String),
    Disconnected(DisconnectReason),
}

enum Command {
    Relay(RelayEvent),
    Stop,
}

pub struct Dispatcher {
    participant: Arc<dyn SignalingParticipant>,
    events: Arc<Events>,
}

impl Dispatcher {
    pub fn new(participant: Arc<dyn SignalingParticipant>, events: Arc<Events>) -> Self {
        Self {
            participant,
            events,
        }
    }

    /// Parse one relay message and hand it to the participant
    ///
    /// Nothing here is fatal: malformed input and handler failures are logged
    /// and reported, and the next message is processed normally.
    pub async fn dispatch(&self, text: &str) {
        let msg = match SignalMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("{}", e);
                self.events.errors.emit(&e);
                return;
            }
        };

        if msg == SignalMessage::Unknown {
            debug!("Ignoring unknown relay message: {}", text);
            return;
        }

        let kind = msg.kind();
        debug!("Relay → {} ({})", kind, self.participant.name());
        if let Err(e) = self.participant.handle(msg).await {
            match e {
                Error::UnknownPeer(ref peer_id) => {
                    debug!("Ignoring {} for unknown peer {}", kind, peer_id)
                }
                // already reported by the signaler
                Error::RelayNotConnected(_) => {}
                e => {
                    warn!("Handling {} failed: {}", kind, e);
                    self.events.errors.emit(&e);
                }
            }
        }
    }

    pub async fn handle_event(&self, event: RelayEvent) {
        match event {
            RelayEvent::Connected => {
                self.participant.on_relay_connected().await;
                self.events.relay_connected.emit(&());
            }
            RelayEvent::Message(text) => self.dispatch(&text).await,
            RelayEvent::Disconnected(reason) => {
                self.events.relay_disconnected.emit(&reason);
            }
        }
    }

    /// Subscribe to the relay and drive every event from one task
    pub fn spawn(self, relay: &RelayEvents) -> DispatcherHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let tx = tx.clone();
            relay.connected.subscribe(move |_| {
                let _ = tx.send(Command::Relay(RelayEvent::Connected));
            });
        }
        {
            let tx = tx.clone();
            relay.message.subscribe(move |text: &String| {
                let _ = tx.send(Command::Relay(RelayEvent::Message(text.clone())));
            });
        }
        {
            let tx = tx.clone();
            relay.disconnected.subscribe(move |reason: &DisconnectReason| {
                let _ = tx.send(Command::Relay(RelayEvent::Disconnected(reason.clone())));
            });
        }

        let task = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Relay(event) => self.handle_event(event).await,
                    Command::Stop => break,
                }
            }
            info!("Dispatcher stopped");
        });

        DispatcherHandle { tx, task }
    }
}

pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Finish what is already queued, then stop
    pub async fn stop(self) {
        let _ = self.tx.send(Command::Stop);
        let _ = self.task.await;
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        handled: Mutex<Vec<SignalMessage>>,
        connected: Mutex<usize>,
    }

    #[async_trait]
    impl SignalingParticipant for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn handle(&self, msg: SignalMessage) -> Result<()> {
            let fail = matches!(msg, SignalMessage::Error { .. });
            self.handled.lock().push(msg);
            if fail {
                return Err(Error::Engine("boom".into()));
            }
            Ok(())
        }

        async fn on_relay_connected(&self) {
            *self.connected.lock() += 1;
        }

        async fn shutdown(&self) {}
    }

    fn error_counter(events: &Events) -> Arc<Mutex<Vec<String>>> {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        events.errors.subscribe(move |e| sink.lock().push(e.to_string()));
        errors
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_stop_dispatch() {
        let recorder = Arc::new(Recorder::default());
        let events = Events::new();
        let errors = error_counter(&events);
        let dispatcher = Dispatcher::new(recorder.clone(), events);

        dispatcher.dispatch("{not json").await;
        dispatcher.dispatch(r#"{"room_id":"R1"}"#).await;
        dispatcher
            .dispatch(r#"{"type":"room_created","room_id":"R1"}"#)
            .await;

        assert_eq!(errors.lock().len(), 2);
        assert_eq!(
            *recorder.handled.lock(),
            vec![SignalMessage::RoomCreated {
                room_id: "R1".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_is_silent() {
        let recorder = Arc::new(Recorder::default());
        let events = Events::new();
        let errors = error_counter(&events);
        let dispatcher = Dispatcher::new(recorder.clone(), events);

        dispatcher.dispatch(r#"{"type":"room_stats","count":2}"#).await;

        assert!(errors.lock().is_empty());
        assert!(recorder.handled.lock().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let recorder = Arc::new(Recorder::default());
        let events = Events::new();
        let errors = error_counter(&events);
        let dispatcher = Dispatcher::new(recorder.clone(), events);

        dispatcher
            .dispatch(r#"{"type":"error","message":"room full"}"#)
            .await;
        dispatcher
            .dispatch(r#"{"type":"peer_joined","peer_id":"P1"}"#)
            .await;

        assert_eq!(*errors.lock(), vec!["Transport engine error: boom"]);
        assert_eq!(recorder.handled.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_keeps_arrival_order() {
        let recorder = Arc::new(Recorder::default());
        let events = Events::new();
        let relay = RelayEvents::default();
        let disconnects = Arc::new(Mutex::new(Vec::new()));
        {
            let disconnects = disconnects.clone();
            events
                .relay_disconnected
                .subscribe(move |r| disconnects.lock().push(r.clone()));
        }

        let handle = Dispatcher::new(recorder.clone(), events).spawn(&relay);
        relay.connected.emit(&());
        for i in 0..20 {
            relay
                .message
                .emit(&format!(r#"{{"type":"peer_joined","peer_id":"P{i}"}}"#));
        }
        relay.disconnected.emit(&DisconnectReason::RemoteClosed);
        handle.stop().await;

        let ids: Vec<String> = recorder
            .handled
            .lock()
            .iter()
            .map(|m| match m {
                SignalMessage::PeerJoined { peer_id } => peer_id.to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("P{i}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(*recorder.connected.lock(), 1);
        assert_eq!(*disconnects.lock(), vec![DisconnectReason::RemoteClosed]);
    }

    #[test]
    fn test_signaler_drops_and_reports_while_disconnected() {
        let sink = RecordingSink::new();
        let events = Events::new();
        let errors = error_counter(&events);
        let signaler = Signaler::new(sink.clone(), events);

        sink.set_connected(false);
        let err = signaler
            .send(&SignalMessage::JoinRoom {
                room_id: "R1".into(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::RelayNotConnected("join_room")));
        assert_eq!(errors.lock().len(), 1);

        // try_send fails the same way but stays quiet
        assert!(signaler.try_send(&SignalMessage::CreateRoom).is_err());
        assert_eq!(errors.lock().len(), 1);

        // a dropped message is not replayed once the relay is back
        sink.set_connected(true);
        signaler.send(&SignalMessage::CreateRoom).unwrap();
        assert_eq!(sink.kinds(), vec!["create_room"]);
    }
}
