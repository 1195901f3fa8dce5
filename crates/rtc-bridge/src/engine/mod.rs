//! Seam to the underlying RTC library
//!
//! The bridge never negotiates media itself. It constructs native objects
//! through an [`RtcEngine`], delegates operations to them, and receives their
//! asynchronous notifications as [`NativeEvent`]s on a channel handed to the
//! engine when a peer connection is created. Those notifications arrive from
//! the library's own execution contexts, in parallel with commands.
//!
//! [`webrtc_rs::WebRtcEngine`] is the production engine.

pub mod webrtc_rs;

use crate::config::{MediaConstraints, MediaStreamConstraints, RtcConfiguration};
use crate::media::{TrackKind, TrackState};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use self::webrtc_rs::{WebRtcEngine, WebRtcPeerConnection, WebRtcTrack};

/// SDP type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description as exchanged with the scripting side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate as exchanged with the scripting side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(default)]
    pub sdp_mid: Option<String>,

    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,

    #[serde(default)]
    pub username_fragment: Option<String>,
}

/// Peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Offer/answer signaling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// ICE connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// ICE gathering state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Notification raised by a native peer connection
pub enum NativeEvent<T> {
    ConnectionStateChanged(PeerConnectionState),
    SignalingStateChanged(SignalingState),
    IceConnectionStateChanged(IceConnectionState),
    IceGatheringStateChanged(IceGatheringState),
    IceCandidate(IceCandidate),
    /// The remote peer started sending a track
    TrackAdded {
        stream_id: String,
        track: Arc<T>,
    },
}

impl<T> std::fmt::Debug for NativeEvent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeEvent::ConnectionStateChanged(s) => {
                f.debug_tuple("ConnectionStateChanged").field(s).finish()
            }
            NativeEvent::SignalingStateChanged(s) => {
                f.debug_tuple("SignalingStateChanged").field(s).finish()
            }
            NativeEvent::IceConnectionStateChanged(s) => {
                f.debug_tuple("IceConnectionStateChanged").field(s).finish()
            }
            NativeEvent::IceGatheringStateChanged(s) => {
                f.debug_tuple("IceGatheringStateChanged").field(s).finish()
            }
            NativeEvent::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            NativeEvent::TrackAdded { stream_id, .. } => f
                .debug_struct("TrackAdded")
                .field("stream_id", stream_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Sender half handed to the engine for one peer connection.
///
/// Unbounded so that library callbacks never wait on the bridge.
pub type NativeEventSender<T> = mpsc::UnboundedSender<NativeEvent<T>>;

/// A native media track
pub trait NativeTrack: Send + Sync + 'static {
    /// Track id assigned by the library
    fn id(&self) -> String;

    fn kind(&self) -> TrackKind;

    fn is_remote(&self) -> bool;

    fn is_enabled(&self) -> bool;

    /// Toggle output. The track stays live either way.
    fn set_enabled(&self, enabled: bool);

    fn ready_state(&self) -> TrackState;

    /// End the track permanently
    fn stop(&self);
}

/// A native peer connection
#[async_trait]
pub trait NativePeerConnection: Send + Sync + 'static {
    type Track: NativeTrack;

    async fn create_offer(&self, constraints: &MediaConstraints) -> Result<SessionDescription>;

    async fn create_answer(&self, constraints: &MediaConstraints) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn set_configuration(&self, config: &RtcConfiguration) -> Result<()>;

    /// Start sending a local track
    async fn add_track(&self, track: Arc<Self::Track>) -> Result<()>;

    /// Stop sending a track. Removing a track that was never added is a no-op.
    async fn remove_track(&self, track: &Self::Track) -> Result<()>;

    /// Tear the connection down
    async fn close(&self) -> Result<()>;
}

/// Factory for native objects
#[async_trait]
pub trait RtcEngine: Send + Sync + 'static {
    type Track: NativeTrack;
    type PeerConnection: NativePeerConnection<Track = Self::Track>;

    /// Construct a peer connection whose notifications go to `events`
    async fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
        constraints: &MediaConstraints,
        events: NativeEventSender<Self::Track>,
    ) -> Result<Arc<Self::PeerConnection>>;

    /// Construct a local track of `kind` belonging to stream `stream_id`
    async fn create_local_track(
        &self,
        kind: TrackKind,
        stream_id: &str,
        constraints: &MediaStreamConstraints,
    ) -> Result<Arc<Self::Track>>;
}
