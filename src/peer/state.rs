use crate::error::{Error, Result};
use crate::peer::engine::{DataChannel, EngineSession};
use crate::peer::ice::{CandidateSummary, InboundIce, OutboundIce};
use crate::peer::types::{ChannelState, PeerId, Role, SessionDescription};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snapshot of one session for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub channel: ChannelState,
    pub since: DateTime<Utc>,
}

impl PeerInfo {
    /// Whole seconds since the session was created
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.since).num_seconds().max(0)
    }
}

/// One negotiated or negotiating peer link
///
/// Inbound ICE state sits behind an async mutex because it is held across
/// engine calls: a candidate arriving while the remote description is being
/// applied waits, then goes straight to the engine after the drained ones.
/// The outbound buffer and channel slot are touched from synchronous engine
/// callbacks and use a plain mutex.
pub struct PeerSession {
    peer_id: PeerId,
    role: Role,
    transport: Arc<dyn EngineSession>,
    created_at: DateTime<Utc>,
    inbound: tokio::sync::Mutex<InboundIce>,
    outbound: Mutex<OutboundIce>,
    gathered: Mutex<CandidateSummary>,
    channel: Mutex<Option<Arc<dyn DataChannel>>>,
}

impl PeerSession {
    pub fn new(peer_id: PeerId, role: Role, transport: Arc<dyn EngineSession>) -> Arc<Self> {
        Arc::new(Self {
            peer_id,
            role,
            transport,
            created_at: Utc::now(),
            inbound: tokio::sync::Mutex::new(InboundIce::default()),
            outbound: Mutex::new(OutboundIce::default()),
            gathered: Mutex::new(CandidateSummary::default()),
            channel: Mutex::new(None),
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn transport(&self) -> &Arc<dyn EngineSession> {
        &self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.peer_id.clone(),
            channel: self.channel_state(),
            since: self.created_at,
        }
    }

    pub async fn remote_description_set(&self) -> bool {
        self.inbound.lock().await.remote_description_set()
    }

    pub async fn pending_inbound(&self) -> Vec<String> {
        self.inbound.lock().await.pending().to_vec()
    }

    /// Apply the remote description, then every buffered candidate in arrival
    /// order. Returns the number of drained candidates.
    pub async fn apply_remote_description(&self, desc: SessionDescription) -> Result<usize> {
        let mut inbound = self.inbound.lock().await;
        if inbound.remote_description_set() {
            return Err(Error::InvalidState(format!(
                "remote description already set for {}",
                self.peer_id
            )));
        }

        self.transport.set_remote_description(desc).await?;

        let pending = inbound.mark_remote_set();
        let drained = pending.len();
        for candidate in pending {
            debug!("Applying pending candidate for {}: {}", self.peer_id, candidate);
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!("Failed to apply pending candidate for {}: {}", self.peer_id, e);
            }
        }
        Ok(drained)
    }

    /// Apply now if the remote description exists, otherwise buffer.
    /// Returns `true` when the candidate reached the engine.
    pub async fn add_remote_candidate(&self, candidate: String) -> Result<bool> {
        let mut inbound = self.inbound.lock().await;
        match inbound.admit(candidate) {
            Some(candidate) => {
                self.transport.add_ice_candidate(candidate).await?;
                Ok(true)
            }
            None => {
                debug!(
                    "Remote description not set for {}, queued candidate ({} pending)",
                    self.peer_id,
                    inbound.pending().len()
                );
                Ok(false)
            }
        }
    }

    /// Hand a freshly discovered local candidate to `send`, or keep it for a
    /// later [`PeerSession::flush_outbound`].
    pub fn push_local_candidate<F>(&self, candidate: String, send: F)
    where
        F: Fn(&str) -> Result<()>,
    {
        self.gathered.lock().record(&candidate);
        self.outbound.lock().push(candidate, send);
    }

    /// Counts of local candidates gathered so far, by type
    pub fn candidate_summary(&self) -> CandidateSummary {
        *self.gathered.lock()
    }

    /// Mark local candidates sendable and drain the backlog in discovery order
    pub fn flush_outbound<F>(&self, send: F) -> usize
    where
        F: Fn(&str) -> Result<()>,
    {
        self.outbound.lock().flush(send)
    }

    /// Retry the backlog after a relay reconnect; no-op until the first flush
    pub fn resume_outbound<F>(&self, send: F) -> usize
    where
        F: Fn(&str) -> Result<()>,
    {
        let mut outbound = self.outbound.lock();
        if !outbound.is_ready() {
            return 0;
        }
        outbound.flush(send)
    }

    pub fn pending_outbound_len(&self) -> usize {
        self.outbound.lock().pending_len()
    }

    pub fn set_channel(&self, channel: Arc<dyn DataChannel>) {
        *self.channel.lock() = Some(channel);
    }

    pub fn channel(&self) -> Option<Arc<dyn DataChannel>> {
        self.channel.lock().clone()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
            .lock()
            .as_ref()
            .map(|dc| dc.state())
            .unwrap_or(ChannelState::Absent)
    }

    /// Send on the data channel if it is open; `Ok(false)` otherwise
    pub async fn send(&self, data: &Bytes) -> Result<bool> {
        let Some(dc) = self.channel() else {
            return Ok(false);
        };
        if dc.state() != ChannelState::Open {
            return Ok(false);
        }
        dc.send(data).await?;
        Ok(true)
    }

    pub async fn close(&self) {
        let dc = self.channel.lock().take();
        if let Some(dc) = dc {
            if let Err(e) = dc.close().await {
                debug!("Closing data channel for {}: {}", self.peer_id, e);
            }
        }
        if let Err(e) = self.transport.close().await {
            warn!("Closing transport for {}: {}", self.peer_id, e);
        }
    }
}
