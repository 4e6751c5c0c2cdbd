use crate::error::Result;
use crate::peer::engine::{
    ChannelCloseHandler, ChannelMessageHandler, ChannelOpenHandler, DataChannel,
};
use crate::peer::types::ChannelState;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

#[derive(Default)]
struct Handlers {
    open: Mutex<Vec<ChannelOpenHandler>>,
    message: Mutex<Vec<ChannelMessageHandler>>,
    close: Mutex<Vec<ChannelCloseHandler>>,
}

/// webrtc-rs data channel behind the engine contract
///
/// webrtc-rs keeps a single callback per event, so one forwarding callback
/// is installed up front and fans out to every registered handler in order.
pub struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
    handlers: Arc<Handlers>,
}

impl WebRtcChannel {
    pub fn new(dc: Arc<RTCDataChannel>) -> Self {
        let handlers = Arc::new(Handlers::default());

        let h = handlers.clone();
        dc.on_open(Box::new(move || {
            let open = h.open.lock().clone();
            for handler in open {
                handler();
            }
            Box::pin(async {})
        }));

        let h = handlers.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let message = h.message.lock().clone();
            for handler in message {
                handler(msg.data.clone());
            }
            Box::pin(async {})
        }));

        let h = handlers.clone();
        dc.on_close(Box::new(move || {
            let close = h.close.lock().clone();
            for handler in close {
                handler();
            }
            Box::pin(async {})
        }));

        Self { dc, handlers }
    }
}

pub fn channel_state(state: RTCDataChannelState) -> ChannelState {
    match state {
        RTCDataChannelState::Open => ChannelState::Open,
        RTCDataChannelState::Closing | RTCDataChannelState::Closed => ChannelState::Closed,
        _ => ChannelState::Opening,
    }
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn label(&self) -> String {
        self.dc.label().to_owned()
    }

    fn state(&self) -> ChannelState {
        channel_state(self.dc.ready_state())
    }

    async fn send(&self, data: &Bytes) -> Result<()> {
        let n = self.dc.send(data).await?;
        debug!("Sent {} bytes on '{}'", n, self.dc.label());
        Ok(())
    }

    fn on_open(&self, handler: ChannelOpenHandler) {
        self.handlers.open.lock().push(handler);
    }

    fn on_message(&self, handler: ChannelMessageHandler) {
        self.handlers.message.lock().push(handler);
    }

    fn on_close(&self, handler: ChannelCloseHandler) {
        self.handlers.close.lock().push(handler);
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }
}
