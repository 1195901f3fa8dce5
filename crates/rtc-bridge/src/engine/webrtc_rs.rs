//! Engine backed by webrtc-rs

use super::{
    IceCandidate, IceConnectionState, IceGatheringState, NativeEvent, NativeEventSender,
    NativePeerConnection, NativeTrack, PeerConnectionState, RtcEngine, SdpType,
    SessionDescription, SignalingState,
};
use crate::config::{
    BundlePolicy, IceTransportPolicy, MediaConstraints, MediaStreamConstraints, RtcConfiguration,
};
use crate::media::{TrackKind, TrackState};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::{RTCAnswerOptions, RTCOfferOptions};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Production engine: one webrtc-rs `API` shared by every connection
pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    /// Build the webrtc-rs API with default codecs and interceptors
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();

        // Opus for audio, VP8/VP9/H.264 for video
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::library("codecs", format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| {
                Error::library(
                    "interceptors",
                    format!("Failed to register interceptors: {}", e),
                )
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        Ok(Self { api })
    }
}

fn to_rtc_configuration(config: &RtcConfiguration) -> RTCConfiguration {
    let ice_servers = config
        .ice_servers
        .iter()
        .map(|server| {
            #[allow(clippy::needless_update)]
            RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            }
        })
        .collect();

    let ice_transport_policy = match config.ice_transport_policy {
        IceTransportPolicy::All => RTCIceTransportPolicy::All,
        IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
    };

    let bundle_policy = match config.bundle_policy {
        BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
        BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
        BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
    };

    RTCConfiguration {
        ice_servers,
        ice_transport_policy,
        bundle_policy,
        ..Default::default()
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(Error::InvalidData(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    parsed.map_err(|e| Error::InvalidData(format!("Failed to parse SDP: {}", e)))
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(Error::library(
                "sdp",
                "library produced a description without a type",
            ))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn map_connection_state(state: RTCPeerConnectionState) -> Option<PeerConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(PeerConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerConnectionState::Closed),
        _ => None,
    }
}

fn map_signaling_state(state: RTCSignalingState) -> Option<SignalingState> {
    match state {
        RTCSignalingState::Stable => Some(SignalingState::Stable),
        RTCSignalingState::HaveLocalOffer => Some(SignalingState::HaveLocalOffer),
        RTCSignalingState::HaveRemoteOffer => Some(SignalingState::HaveRemoteOffer),
        RTCSignalingState::HaveLocalPranswer => Some(SignalingState::HaveLocalPranswer),
        RTCSignalingState::HaveRemotePranswer => Some(SignalingState::HaveRemotePranswer),
        RTCSignalingState::Closed => Some(SignalingState::Closed),
        _ => None,
    }
}

fn map_ice_connection_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

fn map_gathering_state(state: RTCIceGathererState) -> Option<IceGatheringState> {
    match state {
        RTCIceGathererState::New => Some(IceGatheringState::New),
        RTCIceGathererState::Gathering => Some(IceGatheringState::Gathering),
        RTCIceGathererState::Complete => Some(IceGatheringState::Complete),
        _ => None,
    }
}

/// Forward the library's callbacks into the bridge's event channel
fn install_handlers(pc: &RTCPeerConnection, events: NativeEventSender<WebRtcTrack>) {
    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        if let Some(state) = map_connection_state(s) {
            let _ = tx.send(NativeEvent::ConnectionStateChanged(state));
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
        if let Some(state) = map_signaling_state(s) {
            let _ = tx.send(NativeEvent::SignalingStateChanged(state));
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
        if let Some(state) = map_ice_connection_state(s) {
            let _ = tx.send(NativeEvent::IceConnectionStateChanged(state));
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
        if let Some(state) = map_gathering_state(s) {
            let _ = tx.send(NativeEvent::IceGatheringStateChanged(state));
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate| {
        // `None` marks the end of gathering, reported via the gathering state
        if let Some(candidate) = candidate {
            match candidate.to_json() {
                Ok(init) => {
                    let _ = tx.send(NativeEvent::IceCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }));
                }
                Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
            }
        }
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let stream_id = track.stream_id();
        info!(
            "Remote track received: id={}, kind={}, stream_id={}",
            track.id(),
            track.kind(),
            stream_id
        );
        let _ = tx.send(NativeEvent::TrackAdded {
            stream_id,
            track: Arc::new(WebRtcTrack::remote(track)),
        });
        Box::pin(async {})
    }));
}

#[async_trait]
impl RtcEngine for WebRtcEngine {
    type Track = WebRtcTrack;
    type PeerConnection = WebRtcPeerConnection;

    #[instrument(skip_all)]
    async fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
        _constraints: &MediaConstraints,
        events: NativeEventSender<WebRtcTrack>,
    ) -> Result<Arc<WebRtcPeerConnection>> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(to_rtc_configuration(config))
                .await
                .map_err(|e| {
                    Error::library(
                        "peer_connection",
                        format!("Failed to create peer connection: {}", e),
                    )
                })?,
        );

        install_handlers(&pc, events);

        debug!("Created webrtc-rs peer connection");

        Ok(Arc::new(WebRtcPeerConnection {
            pc,
            senders: Mutex::new(HashMap::new()),
        }))
    }

    async fn create_local_track(
        &self,
        kind: TrackKind,
        stream_id: &str,
        _constraints: &MediaStreamConstraints,
    ) -> Result<Arc<WebRtcTrack>> {
        Ok(Arc::new(WebRtcTrack::local(kind, stream_id)))
    }
}

/// Peer connection wrapper
///
/// Keeps the RTP sender of every added track so it can be removed again.
pub struct WebRtcPeerConnection {
    pc: Arc<RTCPeerConnection>,

    /// track id -> sender
    senders: Mutex<HashMap<String, Arc<RTCRtpSender>>>,
}

impl WebRtcPeerConnection {
    /// Access to the raw connection for advanced operations
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    async fn local_description(&self) -> Result<SessionDescription> {
        let local = self.pc.local_description().await.ok_or_else(|| {
            Error::library("sdp", "No local description after negotiation step")
        })?;
        from_rtc_description(local)
    }
}

#[async_trait]
impl NativePeerConnection for WebRtcPeerConnection {
    type Track = WebRtcTrack;

    async fn create_offer(&self, constraints: &MediaConstraints) -> Result<SessionDescription> {
        let options = RTCOfferOptions {
            voice_activity_detection: constraints.voice_activity_detection(),
            ice_restart: constraints.ice_restart(),
        };

        let offer = self
            .pc
            .create_offer(Some(options))
            .await
            .map_err(|e| Error::library("sdp", format!("Failed to create offer: {}", e)))?;

        from_rtc_description(offer)
    }

    async fn create_answer(&self, constraints: &MediaConstraints) -> Result<SessionDescription> {
        let options = RTCAnswerOptions {
            voice_activity_detection: constraints.voice_activity_detection(),
        };

        let answer = self
            .pc
            .create_answer(Some(options))
            .await
            .map_err(|e| Error::library("sdp", format!("Failed to create answer: {}", e)))?;

        from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(to_rtc_description(description)?)
            .await
            .map_err(|e| {
                Error::library("sdp", format!("Failed to set local description: {}", e))
            })?;

        // The library may rewrite the description (ICE credentials, fingerprints)
        let applied = self.local_description().await?;
        debug!("Local description applied ({:?})", applied.sdp_type);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc_description(description)?)
            .await
            .map_err(|e| {
                Error::library("sdp", format!("Failed to set remote description: {}", e))
            })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::library("ice", format!("Failed to add ICE candidate: {}", e)))
    }

    async fn set_configuration(&self, config: &RtcConfiguration) -> Result<()> {
        self.pc
            .set_configuration(to_rtc_configuration(config))
            .await
            .map_err(|e| {
                Error::library(
                    "configuration",
                    format!("Failed to set configuration: {}", e),
                )
            })
    }

    async fn add_track(&self, track: Arc<WebRtcTrack>) -> Result<()> {
        let local = track.local_track().cloned().ok_or_else(|| {
            Error::InvalidData(format!("Remote track {} cannot be sent", track.id()))
        })?;

        if self.senders.lock().contains_key(track.id.as_str()) {
            debug!("Track {} already added, ignoring", track.id);
            return Ok(());
        }

        let sender = self
            .pc
            .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::library("track", format!("Failed to add track: {}", e)))?;

        self.senders.lock().insert(track.id.clone(), sender);
        Ok(())
    }

    async fn remove_track(&self, track: &WebRtcTrack) -> Result<()> {
        let sender = self.senders.lock().remove(track.id.as_str());
        let Some(sender) = sender else {
            return Ok(());
        };

        self.pc
            .remove_track(&sender)
            .await
            .map_err(|e| Error::library("track", format!("Failed to remove track: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.senders.lock().clear();
        self.pc
            .close()
            .await
            .map_err(|e| Error::library("close", format!("Failed to close connection: {}", e)))
    }
}

enum TrackSource {
    Local(Arc<TrackLocalStaticSample>),
    Remote(Arc<TrackRemote>),
}

/// Media track wrapper
///
/// Local tracks are fed by the host through [`write_sample`](Self::write_sample);
/// samples written while the track is disabled or ended are dropped.
pub struct WebRtcTrack {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    enabled: AtomicBool,
    ended: AtomicBool,
}

impl WebRtcTrack {
    /// Create a local sample-fed track (Opus audio, VP8 video)
    pub fn local(kind: TrackKind, stream_id: &str) -> Self {
        let id = format!("{}-{}", kind, uuid::Uuid::new_v4());

        let capability = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000, // Standard 90kHz clock for video
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        };

        let track = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.clone(),
            stream_id.to_string(),
        ));

        Self {
            id,
            kind,
            source: TrackSource::Local(track),
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }

    /// Wrap a track received from the remote peer
    pub fn remote(track: Arc<TrackRemote>) -> Self {
        let kind = match track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        };

        Self {
            id: track.id(),
            kind,
            source: TrackSource::Remote(track),
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }

    /// Underlying local track, if this is a local track
    pub fn local_track(&self) -> Option<&Arc<TrackLocalStaticSample>> {
        match &self.source {
            TrackSource::Local(track) => Some(track),
            TrackSource::Remote(_) => None,
        }
    }

    /// Underlying remote track, if this is a remote track
    pub fn remote_track(&self) -> Option<&Arc<TrackRemote>> {
        match &self.source {
            TrackSource::Remote(track) => Some(track),
            TrackSource::Local(_) => None,
        }
    }

    /// Send one media sample on a local track
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if !self.is_enabled() || self.ready_state() == TrackState::Ended {
            return Ok(());
        }

        let Some(track) = self.local_track() else {
            return Err(Error::InvalidData(format!(
                "Cannot write samples to remote track {}",
                self.id
            )));
        };

        track
            .write_sample(sample)
            .await
            .map_err(|e| Error::library("track", format!("Failed to write sample: {}", e)))
    }
}

impl NativeTrack for WebRtcTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_remote(&self) -> bool {
        matches!(self.source, TrackSource::Remote(_))
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::Acquire) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn stop(&self) {
        self.enabled.store(false, Ordering::Release);
        self.ended.store(true, Ordering::Release);
    }
}
