use crate::error::{Error, Result};
use crate::logger::dump_candidate;
use crate::peer::data_channel::WebRtcChannel;
use crate::peer::engine::{
    DataChannel, EngineSession, LocalCandidateHandler, RemoteChannelHandler, TransportEngine,
};
use crate::peer::ice::candidate_init;
use crate::peer::types::{SdpKind, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::{
    api::{APIBuilder, API},
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

/// Transport engine backed by webrtc-rs
pub struct WebRtcEngine {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcEngine {
    pub fn new(servers: &[ServerConfig]) -> Self {
        Self {
            api: APIBuilder::new().build(),
            ice_servers: ice_servers(servers),
        }
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ice_candidate_pool_size: 10,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TransportEngine for WebRtcEngine {
    async fn create_session(&self) -> Result<Arc<dyn EngineSession>> {
        let pc = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            match st {
                RTCPeerConnectionState::Connected => info!("Peer connection connected"),
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                    warn!("Peer connection {:?}", st)
                }
                _ => debug!("Peer connection state: {:?}", st),
            }
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcSession { pc }))
    }
}

/// Map configured STUN/TURN entries to webrtc-rs ICE servers
pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

pub struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

#[async_trait]
impl EngineSession for WebRtcSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: String) -> Result<()> {
        self.pc.add_ice_candidate(candidate_init(candidate)).await?;
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let dc = self
            .pc
            .create_data_channel(label, Some(RTCDataChannelInit::default()))
            .await?;
        Ok(Arc::new(WebRtcChannel::new(dc)))
    }

    fn on_local_candidate(&self, handler: LocalCandidateHandler) {
        self.pc
            .on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
                match cand {
                    Some(c) => {
                        dump_candidate("LOCAL", &c);
                        match c.to_json() {
                            Ok(init) => handler(init.candidate),
                            Err(e) => warn!("Failed to serialize local candidate: {}", e),
                        }
                    }
                    // None marks the end of gathering
                    None => debug!("ICE candidate gathering completed"),
                }
                Box::pin(async {})
            }));
    }

    fn on_remote_channel(&self, handler: RemoteChannelHandler) {
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                info!("Remote data channel '{}' received", dc.label());
                handler(Arc::new(WebRtcChannel::new(dc)));
                Box::pin(async {})
            }));
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::Engine(format!("close peer connection: {e}")))
    }
}
