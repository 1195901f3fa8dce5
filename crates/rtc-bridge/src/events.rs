//! Events delivered to the scripting side
//!
//! Every event names the handle(s) it concerns so the scripting side can route
//! it to the object wrapper holding that value tag.

use crate::engine::{
    IceCandidate, IceConnectionState, IceGatheringState, PeerConnectionState, SignalingState,
};
use crate::media::{StreamInfo, TrackInfo};
use crate::registry::Handle;
use serde::{Deserialize, Serialize};

/// Handle-tagged notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionStateChanged {
        peer_connection: Handle,
        state: PeerConnectionState,
    },

    #[serde(rename_all = "camelCase")]
    SignalingStateChanged {
        peer_connection: Handle,
        state: SignalingState,
    },

    #[serde(rename_all = "camelCase")]
    IceConnectionStateChanged {
        peer_connection: Handle,
        state: IceConnectionState,
    },

    #[serde(rename_all = "camelCase")]
    IceGatheringStateChanged {
        peer_connection: Handle,
        state: IceGatheringState,
    },

    /// A local ICE candidate was gathered
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        peer_connection: Handle,
        candidate: IceCandidate,
    },

    /// The remote peer announced a new stream
    #[serde(rename_all = "camelCase")]
    StreamAdded {
        peer_connection: Handle,
        stream: StreamInfo,
    },

    /// A remote track joined a stream
    #[serde(rename_all = "camelCase")]
    TrackAdded {
        peer_connection: Handle,
        stream: Handle,
        track: TrackInfo,
    },

    /// A stream was released
    StreamRemoved { stream: Handle },

    /// A track was stopped and released
    TrackEnded { track: Handle },
}

impl BridgeEvent {
    /// Get the event name for logging/debugging
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            BridgeEvent::SignalingStateChanged { .. } => "signaling_state_changed",
            BridgeEvent::IceConnectionStateChanged { .. } => "ice_connection_state_changed",
            BridgeEvent::IceGatheringStateChanged { .. } => "ice_gathering_state_changed",
            BridgeEvent::IceCandidate { .. } => "ice_candidate",
            BridgeEvent::StreamAdded { .. } => "stream_added",
            BridgeEvent::TrackAdded { .. } => "track_added",
            BridgeEvent::StreamRemoved { .. } => "stream_removed",
            BridgeEvent::TrackEnded { .. } => "track_ended",
        }
    }

    /// Peer connection the event concerns, if any
    pub fn peer_connection(&self) -> Option<&Handle> {
        match self {
            BridgeEvent::ConnectionStateChanged { peer_connection, .. }
            | BridgeEvent::SignalingStateChanged { peer_connection, .. }
            | BridgeEvent::IceConnectionStateChanged { peer_connection, .. }
            | BridgeEvent::IceGatheringStateChanged { peer_connection, .. }
            | BridgeEvent::IceCandidate { peer_connection, .. }
            | BridgeEvent::StreamAdded { peer_connection, .. }
            | BridgeEvent::TrackAdded { peer_connection, .. } => Some(peer_connection),
            BridgeEvent::StreamRemoved { .. } | BridgeEvent::TrackEnded { .. } => None,
        }
    }
}
