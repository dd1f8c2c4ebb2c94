//! WebRTC transport backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use flare_common::{IceCandidate, SdpKind, SessionDescription, TransportError};
use flare_config::PeerConfig;
use tokio::sync::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::{PeerTransport, TransportEvent, TransportFactory, TransportSink};

fn description_err(e: webrtc::Error) -> TransportError {
    TransportError::Description(e.to_string())
}

/// Creates one `RTCPeerConnection` per negotiation cycle.
#[derive(Debug, Clone)]
pub struct WebRtcFactory {
    ice_servers: Vec<String>,
    channel_label: String,
}

impl WebRtcFactory {
    pub fn new(ice_servers: Vec<String>, channel_label: impl Into<String>) -> Self {
        Self {
            ice_servers,
            channel_label: channel_label.into(),
        }
    }

    pub fn from_config(config: &PeerConfig) -> Self {
        Self::new(config.ice_servers.clone(), config.channel_label.clone())
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(&self, sink: TransportSink) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(description_err)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media).map_err(description_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(description_err)?,
        );

        let transport = Arc::new(WebRtcTransport {
            pc,
            channel: Arc::new(Mutex::new(None)),
            label: self.channel_label.clone(),
            sink,
        });
        transport.install_handlers();
        Ok(transport)
    }
}

/// A peer connection and the single data channel signals travel on.
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    label: String,
    sink: TransportSink,
}

impl WebRtcTransport {
    fn install_handlers(&self) {
        let sink = self.sink.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let sink = sink.clone();
                Box::pin(async move {
                    // `None` marks the end of gathering; browsers never need it relayed.
                    let Some(candidate) = candidate else {
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => sink.emit(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        })),
                        Err(e) => tracing::warn!(error = %e, "Could not serialize local candidate"),
                    }
                })
            }));

        let sink = self.sink.clone();
        let slot = Arc::clone(&self.channel);
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let sink = sink.clone();
                let slot = Arc::clone(&slot);
                Box::pin(async move {
                    tracing::info!(label = %dc.label(), "Remote data channel announced");
                    attach_channel(&dc, sink);
                    *slot.lock().await = Some(dc);
                })
            }));
    }
}

/// Route a data channel's callbacks into the sink.
fn attach_channel(dc: &Arc<RTCDataChannel>, sink: TransportSink) {
    let open_sink = sink.clone();
    let label = dc.label().to_string();
    dc.on_open(Box::new(move || {
        tracing::info!(label = %label, "Data channel open");
        open_sink.emit(TransportEvent::ChannelOpen);
        Box::pin(async {})
    }));

    let close_sink = sink.clone();
    dc.on_close(Box::new(move || {
        close_sink.emit(TransportEvent::ChannelClosed);
        Box::pin(async {})
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let sink = sink.clone();
        Box::pin(async move {
            if !msg.is_string {
                tracing::debug!(bytes = msg.data.len(), "Ignoring binary data channel message");
                return;
            }
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => sink.emit(TransportEvent::Message(text)),
                Err(e) => tracing::warn!(error = %e, "Data channel text was not UTF-8"),
            }
        })
    }));
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp).map_err(description_err),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp).map_err(description_err),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(desc.sdp).map_err(description_err),
        SdpKind::Rollback => Err(TransportError::Description(
            "rollback descriptions are not supported".into(),
        )),
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let dc = self
            .pc
            .create_data_channel(&self.label, None)
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        attach_channel(&dc, self.sink.clone());
        *self.channel.lock().await = Some(dc);

        let offer = self.pc.create_offer(None).await.map_err(description_err)?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(description_err)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        self.pc
            .set_remote_description(to_rtc(offer)?)
            .await
            .map_err(description_err)?;

        let answer = self.pc.create_answer(None).await.map_err(description_err)?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(description_err)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn accept_answer(&self, answer: SessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc(answer)?)
            .await
            .map_err(description_err)
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::Candidate(e.to_string()))
    }

    async fn send(&self, text: String) -> Result<(), TransportError> {
        let dc = self
            .channel
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotWritable)?;
        if dc.ready_state() != RTCDataChannelState::Open {
            return Err(TransportError::NotWritable);
        }
        dc.send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Channel(e.to_string()))
    }

    async fn is_writable(&self) -> bool {
        match self.channel.lock().await.as_ref() {
            Some(dc) => dc.ready_state() == RTCDataChannelState::Open,
            None => false,
        }
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::debug!(error = %e, "Error closing peer connection");
        }
        self.channel.lock().await.take();
    }
}
