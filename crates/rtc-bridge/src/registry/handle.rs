//! Value tags and the tagged native-object variant

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque value tag standing in for a native object on the scripting side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Generate a fresh handle (UUID v4)
    pub(crate) fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the handle as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the handle, returning the underlying string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The three handle namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    PeerConnection,
    MediaStream,
    MediaTrack,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::PeerConnection => write!(f, "peer connection"),
            ObjectKind::MediaStream => write!(f, "media stream"),
            ObjectKind::MediaTrack => write!(f, "media track"),
        }
    }
}

/// A registered native object, tagged with its kind
///
/// The registry holds a shared reference; the RTC library may hold others.
pub enum NativeObject<P, S, T> {
    PeerConnection(Arc<P>),
    MediaStream(Arc<S>),
    MediaTrack(Arc<T>),
}

impl<P, S, T> NativeObject<P, S, T> {
    /// The table this object lives in
    pub fn kind(&self) -> ObjectKind {
        match self {
            NativeObject::PeerConnection(_) => ObjectKind::PeerConnection,
            NativeObject::MediaStream(_) => ObjectKind::MediaStream,
            NativeObject::MediaTrack(_) => ObjectKind::MediaTrack,
        }
    }

    pub fn as_peer_connection(&self) -> Option<&Arc<P>> {
        match self {
            NativeObject::PeerConnection(pc) => Some(pc),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Arc<S>> {
        match self {
            NativeObject::MediaStream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_track(&self) -> Option<&Arc<T>> {
        match self {
            NativeObject::MediaTrack(track) => Some(track),
            _ => None,
        }
    }
}

// Manual impls: derive would require P, S, T: Clone/Debug.
impl<P, S, T> Clone for NativeObject<P, S, T> {
    fn clone(&self) -> Self {
        match self {
            NativeObject::PeerConnection(pc) => NativeObject::PeerConnection(Arc::clone(pc)),
            NativeObject::MediaStream(stream) => NativeObject::MediaStream(Arc::clone(stream)),
            NativeObject::MediaTrack(track) => NativeObject::MediaTrack(Arc::clone(track)),
        }
    }
}

impl<P, S, T> fmt::Debug for NativeObject<P, S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeObject").field(&self.kind()).finish()
    }
}
