//! Websocket channel to the relay
//!
//! One connection at a time. Each connection gets a writer task that owns
//! the sink (so wire writes never interleave) and a reader task that turns
//! incoming frames into `message` events. The websocket layer already joins
//! continuation frames, so every event is one whole application message.
//!
//! Whatever ends a connection first (remote close, read or write error,
//! local [`RelayChannel::disconnect`]) fires the single `disconnected`
//! event for that connection; no `message` event follows it.

use crate::dispatcher::RelaySink;
use crate::error::{Error, Result};
use crate::events::EventHub;
use crate::utils::random_id;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a local disconnect waits for the close frame to go out
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    RemoteClosed,
    LocalDisconnect,
    Transport(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::RemoteClosed => f.write_str("closed by relay"),
            DisconnectReason::LocalDisconnect => f.write_str("local disconnect"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

#[derive(Default)]
pub struct RelayEvents {
    pub connected: EventHub<()>,
    pub message: EventHub<String>,
    pub disconnected: EventHub<DisconnectReason>,
}

/// Per-connection liveness shared by the reader, the writer and the owner
///
/// Subscribers are invoked under `closed`, so they must not call back into
/// the channel synchronously.
struct LinkState {
    id: String,
    open: AtomicBool,
    closed: Mutex<bool>,
    events: Arc<RelayEvents>,
}

impl LinkState {
    fn new(id: String, events: Arc<RelayEvents>) -> Self {
        Self {
            id,
            open: AtomicBool::new(true),
            closed: Mutex::new(false),
            events,
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Emit a message unless the connection already ended
    fn deliver(&self, text: String) -> bool {
        let closed = self.closed.lock();
        if *closed {
            return false;
        }
        self.events.message.emit(&text);
        true
    }

    /// End the connection; only the first caller emits `disconnected`
    fn shut(&self, reason: DisconnectReason) -> bool {
        self.open.store(false, Ordering::Release);
        let mut closed = self.closed.lock();
        if *closed {
            debug!(link = %self.id, "Relay already disconnected, ignoring {}", reason);
            return false;
        }
        *closed = true;
        info!(link = %self.id, "Relay disconnected: {}", reason);
        self.events.disconnected.emit(&reason);
        true
    }
}

struct Link {
    state: Arc<LinkState>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

pub struct RelayChannel {
    events: Arc<RelayEvents>,
    link: Mutex<Option<Link>>,
    connecting: tokio::sync::Mutex<()>,
    connect_timeout: Duration,
}

impl RelayChannel {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            events: Arc::new(RelayEvents::default()),
            link: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
            connect_timeout,
        }
    }

    pub fn events(&self) -> &Arc<RelayEvents> {
        &self.events
    }

    /// Live connection state, cleared as soon as either task sees the socket end
    pub fn is_connected(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .is_some_and(|link| link.state.is_open())
    }

    /// Open a new connection. Concurrent calls are serialized; only the
    /// first one while no connection is live succeeds.
    pub async fn connect(&self, url: &str) -> Result<()> {
        let _connecting = self.connecting.lock().await;
        if self.is_connected() {
            return Err(Error::InvalidState("relay already connected".into()));
        }
        // reap a connection that ended on its own
        self.disconnect().await;

        let id = random_id();
        info!(link = %id, "Connecting to relay: {}", url);

        let (ws, _) = timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                Error::Connect(format!("{url}: timed out after {:?}", self.connect_timeout))
            })?
            .map_err(|e| Error::Connect(format!("{url}: {e}")))?;

        info!(link = %id, "Connected to relay");

        let (write, read) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();
        let state = Arc::new(LinkState::new(id, self.events.clone()));

        let writer = tokio::spawn(writer_task(write, rx, state.clone()));
        let reader = tokio::spawn(reader_task(read, state.clone(), start_rx));
        let replaced = self.link.lock().replace(Link {
            state,
            outbound: tx,
            reader,
            writer,
        });
        if let Some(old) = replaced {
            old.state.shut(DisconnectReason::LocalDisconnect);
        }

        // sendable before anyone hears about it; messages only after `connected`
        self.events.connected.emit(&());
        let _ = start_tx.send(());
        Ok(())
    }

    /// Queue one whole text message for the writer task
    pub fn send(&self, text: String) -> Result<()> {
        let link = self.link.lock();
        let Some(link) = link.as_ref().filter(|l| l.state.is_open()) else {
            return Err(Error::RelayNotConnected("message"));
        };
        link.outbound
            .send(Message::Text(text))
            .map_err(|_| Error::Transport("relay writer stopped".into()))
    }

    /// Tear down the current connection, if any
    ///
    /// Cancels the receive loop, sends a close frame and waits (bounded) for
    /// the writer to release the socket.
    pub async fn disconnect(&self) {
        let link = self.link.lock().take();
        let Some(mut link) = link else {
            return;
        };

        link.state.shut(DisconnectReason::LocalDisconnect);
        let _ = link.outbound.send(Message::Close(None));

        link.reader.abort();
        let _ = (&mut link.reader).await;

        if timeout(CLOSE_GRACE, &mut link.writer).await.is_err() {
            warn!(link = %link.state.id, "Relay writer did not finish, aborting");
            link.writer.abort();
        }
        debug!(link = %link.state.id, "Relay connection released");
    }
}

impl RelaySink for RelayChannel {
    fn is_connected(&self) -> bool {
        RelayChannel::is_connected(self)
    }

    fn send_text(&self, text: String) -> Result<()> {
        self.send(text)
    }
}

async fn writer_task(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    state: Arc<LinkState>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = write.send(msg).await {
            error!(link = %state.id, "Failed to send relay message: {}", e);
            state.shut(DisconnectReason::Transport(e.to_string()));
            break;
        }
        if closing {
            break;
        }
    }
    let _ = write.close().await;
    debug!(link = %state.id, "Relay writer terminated");
}

async fn reader_task(
    mut read: SplitStream<WsStream>,
    state: Arc<LinkState>,
    start: oneshot::Receiver<()>,
) {
    let _ = start.await;
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                state.deliver(text);
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => {
                    state.deliver(text);
                }
                Err(_) => warn!(link = %state.id, "Ignoring non-UTF-8 binary relay message"),
            },
            Some(Ok(Message::Close(frame))) => {
                if let Some(frame) = frame {
                    debug!(link = %state.id, "Relay close frame: {} {}", frame.code, frame.reason);
                }
                break DisconnectReason::RemoteClosed;
            }
            // ping/pong are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => break DisconnectReason::Transport(e.to_string()),
            None => break DisconnectReason::RemoteClosed,
        }
    };
    state.shut(reason);
    debug!(link = %state.id, "Relay reader terminated");
}
