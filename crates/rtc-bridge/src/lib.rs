//! Native WebRTC objects for a scripting runtime
//!
//! Scripts never hold native objects. They hold value tags ([`Handle`]s),
//! and every call names its target by handle. This crate keeps the
//! handle-to-object tables, runs commands against the objects, and sends
//! native notifications back tagged with the handles they concern.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Scripting side (handles only)                       │
//! │  ↓ Command (JSON)             ↑ BridgeEvent (JSON)   │
//! │  RtcBridge<E>                                        │
//! │  ├─ HandleRegistry (tables + ownership tree)         │
//! │  │   PeerConnection ─ MediaStream ─ MediaTrack       │
//! │  └─ per-connection event forwarders                  │
//! │     ↓                                                │
//! │  RtcEngine (webrtc-rs by default)                    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use rtc_bridge::{HandleRegistry, NativeObject, ObjectKind};
//! use std::sync::Arc;
//!
//! let registry: HandleRegistry<String, String, String> = HandleRegistry::new();
//! let pc = registry
//!     .insert(NativeObject::PeerConnection(Arc::new("pc".to_string())), None)
//!     .unwrap();
//! let stream = registry
//!     .insert(NativeObject::MediaStream(Arc::new("s".to_string())), Some(&pc))
//!     .unwrap();
//!
//! // Releasing the connection releases the stream it owns
//! assert_eq!(registry.release_all(&pc).len(), 2);
//! assert!(registry.resolve(&stream, ObjectKind::MediaStream).is_none());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use rtc_bridge::{BridgeConfig, RtcBridge, RtcConfiguration, WebRtcEngine};
//!
//! # async fn example() -> rtc_bridge::Result<()> {
//! let bridge = RtcBridge::new(WebRtcEngine::new()?, BridgeConfig::default())?;
//! let mut events = bridge.take_event_receiver().expect("receiver taken once");
//!
//! let pc = bridge
//!     .create_peer_connection(RtcConfiguration::default(), &Default::default())
//!     .await?;
//! let offer = bridge.create_offer(&pc, &Default::default()).await?;
//! bridge.set_local_description(&pc, offer).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod bridge;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod registry;

pub use bridge::{BridgeRegistry, RtcBridge};
pub use command::{Command, Response};
pub use config::{
    BridgeConfig, BundlePolicy, FacingMode, IceServer, IceTransportPolicy, MediaConstraints,
    MediaStreamConstraints, RtcConfiguration, VideoConstraints, VideoRequest,
};
pub use engine::{
    IceCandidate, IceConnectionState, IceGatheringState, NativeEvent, NativeEventSender,
    NativePeerConnection, NativeTrack, PeerConnectionState, RtcEngine, SdpType,
    SessionDescription, SignalingState, WebRtcEngine,
};
pub use error::{Error, ErrorCode, Result};
pub use events::BridgeEvent;
pub use media::{MediaStream, StreamInfo, TrackInfo, TrackKind, TrackState};
pub use registry::{Handle, HandleRegistry, NativeObject, ObjectKind, Released};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
