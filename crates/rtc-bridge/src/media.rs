//! Media streams and track snapshots
//!
//! The RTC library has no stream object of its own (a stream is just the
//! stream id its tracks carry), so the bridge keeps a small [`MediaStream`]
//! record. Track membership lives in the registry's ownership tree.

use crate::registry::Handle;
use serde::{Deserialize, Serialize};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Track ready state
///
/// Disabling a track does not end it: a disabled track stays `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// Bridge-side media stream record
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    remote: bool,
}

impl MediaStream {
    /// A local stream with a freshly generated stream id
    pub fn local() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote: false,
        }
    }

    /// A stream announced by the remote peer
    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote: true,
        }
    }

    /// Stream id carried by the stream's tracks
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }
}

/// Track snapshot sent to the scripting side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Value tag of the track
    pub handle: Handle,

    /// Value tag of the stream containing the track
    pub stream_handle: Option<Handle>,

    /// Track id assigned by the RTC library
    pub id: String,

    pub kind: TrackKind,

    pub ready_state: TrackState,

    pub remote: bool,

    pub enabled: bool,
}

/// Stream snapshot sent to the scripting side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Value tag of the stream
    pub handle: Handle,

    /// Stream id
    pub id: String,

    pub remote: bool,

    pub tracks: Vec<TrackInfo>,
}

impl StreamInfo {
    /// Handles of the stream's tracks
    pub fn track_handles(&self) -> Vec<Handle> {
        self.tracks.iter().map(|t| t.handle.clone()).collect()
    }
}
