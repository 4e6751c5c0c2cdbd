//! In-memory transport engine that records every call

use crate::error::{Error, Result};
use crate::peer::engine::{
    ChannelCloseHandler, ChannelMessageHandler, ChannelOpenHandler, DataChannel, EngineSession,
    LocalCandidateHandler, RemoteChannelHandler, TransportEngine,
};
use crate::peer::types::{ChannelState, SessionDescription};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(String),
    CreateDataChannel(String),
    Close,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    sessions: Arc<Mutex<Vec<Arc<MockSession>>>>,
    gathering: Vec<String>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session discovers these local candidates while its local
    /// description is being applied, like a real engine starting to gather
    pub fn gathering(candidates: &[&str]) -> Self {
        Self {
            sessions: Arc::default(),
            gathering: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions.lock()[index].clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl TransportEngine for MockEngine {
    async fn create_session(&self) -> Result<Arc<dyn EngineSession>> {
        // let concurrent callers interleave like a real engine would
        tokio::task::yield_now().await;
        let mut sessions = self.sessions.lock();
        let session = Arc::new(MockSession::new(sessions.len(), self.gathering.clone()));
        sessions.push(session.clone());
        Ok(session)
    }
}

pub struct MockSession {
    index: usize,
    calls: Mutex<Vec<EngineCall>>,
    channels: Mutex<Vec<Arc<MockChannel>>>,
    local_candidate: Mutex<Option<LocalCandidateHandler>>,
    remote_channel: Mutex<Option<RemoteChannelHandler>>,
    fail_remote: AtomicBool,
    gathering: Vec<String>,
}

impl MockSession {
    fn new(index: usize, gathering: Vec<String>) -> Self {
        Self {
            index,
            gathering,
            calls: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            local_candidate: Mutex::new(None),
            remote_channel: Mutex::new(None),
            fail_remote: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn channel(&self, index: usize) -> Arc<MockChannel> {
        self.channels.lock()[index].clone()
    }

    pub fn fail_next_remote_description(&self) {
        self.fail_remote.store(true, Ordering::SeqCst);
    }

    /// Simulate the engine discovering a local candidate
    pub fn discover(&self, candidate: &str) {
        let handler = self.local_candidate.lock().clone();
        if let Some(h) = handler {
            h(candidate.to_string());
        }
    }

    /// Simulate the remote side opening a data channel
    pub fn remote_opens_channel(&self, label: &str) -> Arc<MockChannel> {
        let channel = Arc::new(MockChannel::new(label));
        self.channels.lock().push(channel.clone());
        let handler = self.remote_channel.lock().clone();
        if let Some(h) = handler {
            h(channel.clone());
        }
        channel
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl EngineSession for MockSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateOffer);
        Ok(SessionDescription::offer(format!(
            "v=0\r\no=mock {} 1 IN IP4 0.0.0.0\r\ns=offer\r\n",
            self.index
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateAnswer);
        Ok(SessionDescription::answer(format!(
            "v=0\r\no=mock {} 1 IN IP4 0.0.0.0\r\ns=answer\r\n",
            self.index
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(EngineCall::SetLocal(desc));
        for candidate in &self.gathering {
            self.discover(candidate);
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if self.fail_remote.swap(false, Ordering::SeqCst) {
            return Err(Error::Engine("rejected remote description".into()));
        }
        self.record(EngineCall::SetRemote(desc));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: String) -> Result<()> {
        self.record(EngineCall::AddCandidate(candidate));
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        self.record(EngineCall::CreateDataChannel(label.to_string()));
        let channel = Arc::new(MockChannel::new(label));
        self.channels.lock().push(channel.clone());
        Ok(channel)
    }

    fn on_local_candidate(&self, handler: LocalCandidateHandler) {
        *self.local_candidate.lock() = Some(handler);
    }

    fn on_remote_channel(&self, handler: RemoteChannelHandler) {
        *self.remote_channel.lock() = Some(handler);
    }

    async fn close(&self) -> Result<()> {
        self.record(EngineCall::Close);
        Ok(())
    }
}

pub struct MockChannel {
    label: String,
    state: Mutex<ChannelState>,
    sent: Mutex<Vec<Bytes>>,
    fail_sends: AtomicBool,
    open_handlers: Mutex<Vec<ChannelOpenHandler>>,
    message_handlers: Mutex<Vec<ChannelMessageHandler>>,
    close_handlers: Mutex<Vec<ChannelCloseHandler>>,
}

impl MockChannel {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Mutex::new(ChannelState::Opening),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            open_handlers: Mutex::new(Vec::new()),
            message_handlers: Mutex::new(Vec::new()),
            close_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn open(&self) {
        *self.state.lock() = ChannelState::Open;
        let handlers = self.open_handlers.lock().clone();
        for h in handlers {
            h();
        }
    }

    pub fn remote_close(&self) {
        *self.state.lock() = ChannelState::Closed;
        let handlers = self.close_handlers.lock().clone();
        for h in handlers {
            h();
        }
    }

    pub fn deliver(&self, data: &[u8]) {
        let handlers = self.message_handlers.lock().clone();
        for h in handlers {
            h(Bytes::copy_from_slice(data));
        }
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl DataChannel for MockChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    async fn send(&self, data: &Bytes) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Engine("sctp write failed".into()));
        }
        self.sent.lock().push(data.clone());
        Ok(())
    }

    fn on_open(&self, handler: ChannelOpenHandler) {
        self.open_handlers.lock().push(handler);
    }

    fn on_message(&self, handler: ChannelMessageHandler) {
        self.message_handlers.lock().push(handler);
    }

    fn on_close(&self, handler: ChannelCloseHandler) {
        self.close_handlers.lock().push(handler);
    }

    async fn close(&self) -> Result<()> {
        *self.state.lock() = ChannelState::Closed;
        Ok(())
    }
}
