//! Transport engine contract
//!
//! The orchestrator never talks to webrtc-rs directly; roles drive these
//! traits so the negotiation logic can run against the real engine
//! ([`crate::peer::connection::WebRtcEngine`]) or an in-memory one in tests.
//!
//! Callbacks are plain synchronous closures. The engine may fire them from
//! any task, concurrently with relay dispatch and with each other. Channel
//! handlers accumulate and run in registration order; session handlers
//! replace the previous one.

use super::types::{ChannelState, SessionDescription};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub type LocalCandidateHandler = Arc<dyn Fn(String) + Send + Sync>;
pub type RemoteChannelHandler = Arc<dyn Fn(Arc<dyn DataChannel>) + Send + Sync>;
pub type ChannelOpenHandler = Arc<dyn Fn() + Send + Sync>;
pub type ChannelMessageHandler = Arc<dyn Fn(Bytes) + Send + Sync>;
pub type ChannelCloseHandler = Arc<dyn Fn() + Send + Sync>;

#[async_trait]
pub trait TransportEngine: Send + Sync {
    async fn create_session(&self) -> Result<Arc<dyn EngineSession>>;
}

#[async_trait]
pub trait EngineSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    /// Must succeed before [`EngineSession::add_ice_candidate`] is meaningful
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    /// Precondition: remote description already set
    async fn add_ice_candidate(&self, candidate: String) -> Result<()>;
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;
    fn on_local_candidate(&self, handler: LocalCandidateHandler);
    fn on_remote_channel(&self, handler: RemoteChannelHandler);
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;
    fn state(&self) -> ChannelState;
    async fn send(&self, data: &Bytes) -> Result<()>;
    fn on_open(&self, handler: ChannelOpenHandler);
    fn on_message(&self, handler: ChannelMessageHandler);
    fn on_close(&self, handler: ChannelCloseHandler);
    async fn close(&self) -> Result<()>;
}
