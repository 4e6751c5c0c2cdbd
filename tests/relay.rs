use futures_util::{SinkExt, StreamExt};
use rtc_relay::{DisconnectReason, Error, PeerId, RelayChannel, SignalMessage};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

/// Local relay stand-in; every accepted websocket goes to `handler`
async fn serve<F, Fut>(handler: F) -> String
where
    F: Fn(WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    handler(ws).await;
                }
            });
        }
    });
    format!("ws://{addr}/ws")
}

async fn echo(mut ws: WebSocketStream<TcpStream>) {
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_text() && ws.send(msg).await.is_err() {
            break;
        }
    }
}

async fn close_immediately(mut ws: WebSocketStream<TcpStream>) {
    let _ = ws.close(None).await;
    while let Some(Ok(_)) = ws.next().await {}
}

struct Observed {
    messages: mpsc::UnboundedReceiver<String>,
    disconnects: mpsc::UnboundedReceiver<DisconnectReason>,
    disconnect_count: Arc<AtomicUsize>,
}

fn observe(relay: &RelayChannel) -> Observed {
    let (msg_tx, messages) = mpsc::unbounded_channel();
    let (dc_tx, disconnects) = mpsc::unbounded_channel();
    let disconnect_count = Arc::new(AtomicUsize::new(0));

    relay.events().message.subscribe(move |text: &String| {
        let _ = msg_tx.send(text.clone());
    });
    {
        let count = disconnect_count.clone();
        relay
            .events()
            .disconnected
            .subscribe(move |reason: &DisconnectReason| {
                count.fetch_add(1, Ordering::SeqCst);
                let _ = dc_tx.send(reason.clone());
            });
    }

    Observed {
        messages,
        disconnects,
        disconnect_count,
    }
}

#[tokio::test]
async fn test_multiline_sdp_round_trip() {
    let url = serve(echo).await;
    let relay = RelayChannel::new(WAIT);
    let mut observed = observe(&relay);

    relay.connect(&url).await.unwrap();
    assert!(relay.is_connected());

    let mut sdp = String::from("v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
    for i in 0..2000 {
        sdp.push_str(&format!("a=candidate:{i} 1 udp 2130706431 10.0.0.{} 5000 typ host\r\n", i % 255));
    }
    let offer = SignalMessage::Offer {
        peer_id: Some(PeerId::from("P1")),
        sdp: sdp.clone(),
    };
    relay.send(offer.to_json().unwrap()).unwrap();

    let echoed = timeout(WAIT, observed.messages.recv())
        .await
        .unwrap()
        .unwrap();
    match SignalMessage::parse(&echoed).unwrap() {
        SignalMessage::Offer { peer_id, sdp: got } => {
            assert_eq!(peer_id, Some(PeerId::from("P1")));
            assert_eq!(got.as_bytes(), sdp.as_bytes());
        }
        other => panic!("unexpected {other:?}"),
    }

    relay.disconnect().await;
    assert!(!relay.is_connected());
    assert_eq!(
        timeout(WAIT, observed.disconnects.recv()).await.unwrap(),
        Some(DisconnectReason::LocalDisconnect)
    );
}

#[tokio::test]
async fn test_remote_close_notifies_once() {
    let url = serve(close_immediately).await;
    let relay = RelayChannel::new(WAIT);
    let mut observed = observe(&relay);

    relay.connect(&url).await.unwrap();
    let reason = timeout(WAIT, observed.disconnects.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, DisconnectReason::RemoteClosed);
    assert!(!relay.is_connected());

    // tearing down an already-ended connection stays silent
    relay.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(observed.disconnect_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_close_and_disconnect_notify_once() {
    let url = serve(close_immediately).await;

    for _ in 0..20 {
        let relay = RelayChannel::new(WAIT);
        let observed = observe(&relay);

        relay.connect(&url).await.unwrap();
        relay.disconnect().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(observed.disconnect_count.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_send_after_remote_close_is_dropped_not_replayed() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel::<String>();
    let connections = Arc::new(AtomicUsize::new(0));
    let url = {
        let connections = connections.clone();
        serve(move |mut ws| {
            let seen_tx = seen_tx.clone();
            let first = connections.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    let _ = ws.close(None).await;
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let _ = seen_tx.send(text);
                    }
                }
            }
        })
        .await
    };

    let relay = RelayChannel::new(WAIT);
    let mut observed = observe(&relay);
    relay.connect(&url).await.unwrap();
    timeout(WAIT, observed.disconnects.recv())
        .await
        .unwrap()
        .unwrap();

    let err = relay.send("lost".into()).unwrap_err();
    assert!(matches!(err, Error::RelayNotConnected(_)));

    relay.connect(&url).await.unwrap();
    relay.send("after".into()).unwrap();

    let first = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(first, "after");
    relay.disconnect().await;
}

#[tokio::test]
async fn test_connect_times_out_without_handshake() {
    // accepts TCP but never answers the websocket upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let relay = RelayChannel::new(Duration::from_millis(300));
    let err = relay.connect(&format!("ws://{addr}/ws")).await.unwrap_err();
    assert!(matches!(err, Error::Connect(ref msg) if msg.contains("timed out")));
    assert!(!relay.is_connected());
    drop(listener);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let url = serve(echo).await;
    let relay = RelayChannel::new(WAIT);
    relay.connect(&url).await.unwrap();
    assert!(matches!(
        relay.connect(&url).await,
        Err(Error::InvalidState(_))
    ));
    relay.disconnect().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_keep_one_connection() {
    let url = serve(echo).await;
    let relay = RelayChannel::new(WAIT);
    let observed = observe(&relay);
    let connected = Arc::new(AtomicUsize::new(0));
    {
        let connected = connected.clone();
        relay.events().connected.subscribe(move |_| {
            connected.fetch_add(1, Ordering::SeqCst);
        });
    }

    let (a, b) = tokio::join!(relay.connect(&url), relay.connect(&url));
    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    assert!(matches!(
        if a.is_ok() { b } else { a },
        Err(Error::InvalidState(_))
    ));
    assert_eq!(connected.load(Ordering::SeqCst), 1);

    relay.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(observed.disconnect_count.load(Ordering::SeqCst), 1);
}
