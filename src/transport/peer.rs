//! Peer transport
//!
//! On-demand WebRTC connection negotiated through the reliable channel.
//! The server offers; we answer. It carries two remote media tracks
//! (video, audio) and two sub-channels: `input` (client-created, 2-byte
//! frames) and `audio` (server-created, headered blocks that feed the same
//! decode path as reliable-channel audio).
//!
//! The remote video track is consumed as a sequence of complete encoded
//! frames published into a [`LiveFrameSource`]; the remote audio track is
//! drained and counted only, since playback audio arrives on the audio
//! sub-channel.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use crate::constants::{AUDIO_CHANNEL_LABEL, INPUT_CHANNEL_LABEL};
use crate::error::TransportError;
use crate::session::negotiation::PeerEndpoint;
use crate::transport::{CandidateInit, MediaEvent, MediaSource, TransportKind};
use crate::video::LiveFrameSource;

/// Low-latency media/input path to the streaming server.
pub struct PeerTransport {
    pc: Arc<RTCPeerConnection>,
    input_channel: Arc<RTCDataChannel>,
    input_open: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    track_packets: Arc<AtomicU64>,
}

impl PeerTransport {
    /// Build the peer connection and wire its callbacks.
    ///
    /// Local ICE candidates go out on `candidate_tx` (the session forwards
    /// them over the reliable channel); remote video-track frames land in
    /// `video_source`; everything else becomes a [`MediaEvent`].
    pub async fn new(
        stun_servers: Vec<String>,
        media_tx: mpsc::Sender<MediaEvent>,
        video_source: LiveFrameSource,
        candidate_tx: mpsc::UnboundedSender<CandidateInit>,
    ) -> Result<Arc<Self>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: stun_servers,
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?,
        );

        let connected = Arc::new(AtomicBool::new(false));
        let input_open = Arc::new(AtomicBool::new(false));
        let track_packets = Arc::new(AtomicU64::new(0));

        // Local candidates trickle out through the signaling path.
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate_tx = candidate_tx.clone();
            Box::pin(async move {
                if let Some(c) = candidate {
                    match c.to_json() {
                        Ok(json) => {
                            let _ = candidate_tx.send(CandidateInit {
                                candidate: json.candidate,
                                sdp_mid: json.sdp_mid,
                                sdp_mline_index: json.sdp_mline_index,
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "candidate serialization failed"),
                    }
                }
            })
        }));

        {
            let media_tx = media_tx.clone();
            let connected = connected.clone();
            pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let media_tx = media_tx.clone();
                let connected = connected.clone();
                Box::pin(async move {
                    tracing::debug!(?state, "peer connection state");
                    match state {
                        RTCPeerConnectionState::Connected => {
                            connected.store(true, Ordering::SeqCst);
                            let _ = media_tx.send(MediaEvent::Connected(TransportKind::Peer)).await;
                        }
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => {
                            if connected.swap(false, Ordering::SeqCst) {
                                let _ = media_tx
                                    .send(MediaEvent::Disconnected {
                                        origin: TransportKind::Peer,
                                        reason: format!("{state}"),
                                    })
                                    .await;
                            }
                        }
                        _ => {}
                    }
                })
            }));
        }

        // The server opens the audio sub-channel toward us.
        {
            let media_tx = media_tx.clone();
            pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let media_tx = media_tx.clone();
                Box::pin(async move {
                    if channel.label() != AUDIO_CHANNEL_LABEL {
                        tracing::debug!(label = channel.label(), "ignoring unexpected channel");
                        return;
                    }
                    channel.on_message(Box::new(move |msg: DataChannelMessage| {
                        let media_tx = media_tx.clone();
                        Box::pin(async move {
                            let _ = media_tx
                                .send(MediaEvent::AudioBlock {
                                    origin: TransportKind::Peer,
                                    block: msg.data,
                                })
                                .await;
                        })
                    }));
                })
            }));
        }

        // Remote media tracks.
        {
            let track_packets = track_packets.clone();
            pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
                let video_source = video_source.clone();
                let track_packets = track_packets.clone();
                Box::pin(async move {
                    let kind = track.kind();
                    tracing::info!(?kind, "remote track started");
                    tokio::spawn(async move {
                        loop {
                            match track.read_rtp().await {
                                Ok((packet, _)) => {
                                    track_packets.fetch_add(1, Ordering::Relaxed);
                                    if kind == RTPCodecType::Video {
                                        video_source.publish(packet.payload);
                                    }
                                    // Audio-track samples are drained only;
                                    // playback audio rides the audio channel.
                                }
                                Err(_) => break,
                            }
                        }
                        tracing::debug!(?kind, "remote track ended");
                    });
                })
            }));
        }

        // We open the input sub-channel toward the server.
        let input_channel = pc
            .create_data_channel(INPUT_CHANNEL_LABEL, None)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        {
            let input_open = input_open.clone();
            let media_tx = media_tx.clone();
            input_channel.on_open(Box::new(move || {
                input_open.store(true, Ordering::SeqCst);
                let media_tx = media_tx.clone();
                Box::pin(async move {
                    let _ = media_tx.send(MediaEvent::PeerInputOpen).await;
                })
            }));
        }
        {
            let input_open = input_open.clone();
            input_channel.on_close(Box::new(move || {
                input_open.store(false, Ordering::SeqCst);
                Box::pin(async {})
            }));
        }

        Ok(Arc::new(Self {
            pc,
            input_channel,
            input_open,
            connected,
            closed: AtomicBool::new(false),
            track_packets,
        }))
    }

    /// Whether the input sub-channel is open and ready.
    pub fn input_ready(&self) -> bool {
        self.input_open.load(Ordering::SeqCst)
    }

    /// Send one encoded input frame on the input sub-channel.
    pub async fn send_input(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.input_ready() {
            return Err(TransportError::ChannelClosed);
        }
        self.input_channel
            .send(&payload)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Total RTP packets seen across remote tracks.
    pub fn track_packets(&self) -> u64 {
        self.track_packets.load(Ordering::Relaxed)
    }

    /// Close the underlying connection. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pc.close().await {
            tracing::debug!(error = %e, "peer close");
        }
    }
}

impl PeerEndpoint for PeerTransport {
    /// Apply the server's offer and produce our answer SDP.
    fn set_remote_offer(
        &self,
        sdp: String,
    ) -> impl std::future::Future<Output = Result<String, TransportError>> + Send {
        async move {
            let offer = RTCSessionDescription::offer(sdp)
                .map_err(|e| TransportError::SignalingFailed(e.to_string()))?;
            self.pc
                .set_remote_description(offer)
                .await
                .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

            let answer = self
                .pc
                .create_answer(None)
                .await
                .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
            self.pc
                .set_local_description(answer)
                .await
                .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

            self.pc
                .local_description()
                .await
                .map(|desc| desc.sdp)
                .ok_or_else(|| {
                    TransportError::NegotiationFailed("no local description".to_string())
                })
        }
    }

    fn add_remote_candidate(
        &self,
        candidate: CandidateInit,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send {
        async move {
            self.pc
                .add_ice_candidate(RTCIceCandidateInit {
                    candidate: candidate.candidate,
                    sdp_mid: candidate.sdp_mid,
                    sdp_mline_index: candidate.sdp_mline_index,
                    username_fragment: None,
                })
                .await
                .map_err(|e| TransportError::SignalingFailed(e.to_string()))
        }
    }
}

impl MediaSource for PeerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Peer
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let pc = self.pc.clone();
        self.closed.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            let _ = pc.close().await;
        });
    }
}
