use std::collections::VecDeque;
use tracing::{info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

/// Relay messages carry only the candidate line; the data-only session has a
/// single bundled m-line.
pub fn candidate_init(candidate: String) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate,
        sdp_mid: None,
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Remote candidates gated on the remote description
#[derive(Debug, Default)]
pub struct InboundIce {
    remote_description_set: bool,
    pending: Vec<String>,
}

impl InboundIce {
    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Returns the candidate back when it may be applied right away,
    /// otherwise keeps it until [`InboundIce::mark_remote_set`].
    pub fn admit(&mut self, candidate: String) -> Option<String> {
        if self.remote_description_set {
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Flips the flag (once) and hands back everything buffered, in arrival order
    pub fn mark_remote_set(&mut self) -> Vec<String> {
        self.remote_description_set = true;
        std::mem::take(&mut self.pending)
    }
}

/// Local candidates that could not be signaled yet
///
/// Nothing is sent before `ready` (local description signaled); while the
/// relay is down candidates accumulate and go out in discovery order on the
/// next flush.
#[derive(Debug, Default)]
pub struct OutboundIce {
    ready: bool,
    pending: VecDeque<String>,
}

impl OutboundIce {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Send through `send` unless something older is still waiting
    pub fn push<F, E>(&mut self, candidate: String, send: F)
    where
        F: Fn(&str) -> Result<(), E>,
    {
        if self.ready && self.pending.is_empty() && send(&candidate).is_ok() {
            return;
        }
        self.pending.push_back(candidate);
    }

    /// Mark ready and drain in order; stops at the first failure so nothing
    /// is reordered. Returns how many went out.
    pub fn flush<F, E>(&mut self, send: F) -> usize
    where
        F: Fn(&str) -> Result<(), E>,
    {
        self.ready = true;
        let mut sent = 0;
        while let Some(candidate) = self.pending.front() {
            if send(candidate).is_err() {
                break;
            }
            self.pending.pop_front();
            sent += 1;
        }
        sent
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

impl CandidateSummary {
    pub fn record(&mut self, candidate: &str) {
        if candidate.contains("typ host") {
            self.host += 1;
        } else if candidate.contains("typ srflx") {
            self.srflx += 1;
        } else if candidate.contains("typ relay") {
            self.relay += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.host + self.srflx + self.relay
    }

    pub fn report(&self) {
        info!(
            "Candidate analysis: {} host, {} srflx, {} relay",
            self.host, self.srflx, self.relay
        );
        if self.relay == 0 && self.total() > 0 {
            warn!("No TURN relay candidates found, connection through NAT may fail");
        }
    }
}
