//! Configuration types
//!
//! Peer connection configuration and media constraints arrive from the
//! scripting side as JSON objects, so these types use camelCase field names.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Bridge-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Capacity of the event channel towards the scripting side (default: 1024)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// ICE servers used when a peer connection configuration lists none
    #[serde(default = "default_ice_servers")]
    pub default_ice_servers: Vec<IceServer>,
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::new("stun:stun.l.google.com:19302")]
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            default_ice_servers: default_ice_servers(),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }
        for server in &self.default_ice_servers {
            server.validate()?;
        }
        Ok(())
    }
}

/// STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs. Accepts a single string or an array.
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

impl IceServer {
    /// A server without credentials
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Validate URL schemes; TURN entries need credentials
    pub fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(Error::InvalidConfig(
                "ICE server must list at least one URL".to_string(),
            ));
        }

        for url in &self.urls {
            if url.starts_with("turn:") || url.starts_with("turns:") {
                if self.username.is_none() || self.credential.is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "TURN server {} requires username and credential",
                        url
                    )));
                }
            } else if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "ICE server URL must use stun:, stuns:, turn: or turns:, got {}",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// Which ICE candidates may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    #[default]
    All,
    /// Only TURN relay candidates
    Relay,
}

/// Media bundling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePolicy {
    #[default]
    Balanced,
    MaxCompat,
    MaxBundle,
}

/// Peer connection configuration (`RTCConfiguration`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcConfiguration {
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,

    #[serde(default)]
    pub ice_transport_policy: IceTransportPolicy,

    #[serde(default)]
    pub bundle_policy: BundlePolicy,
}

impl RtcConfiguration {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if any ICE server is malformed, or if the policy is
    /// `relay` and no TURN server is configured.
    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            server.validate()?;
        }

        if self.ice_transport_policy == IceTransportPolicy::Relay {
            let has_turn = self
                .ice_servers
                .iter()
                .flat_map(|s| s.urls.iter())
                .any(|u| u.starts_with("turn:") || u.starts_with("turns:"));
            if !has_turn {
                return Err(Error::InvalidConfig(
                    "iceTransportPolicy 'relay' requires a TURN server".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Fill in the bridge's default ICE servers when none are given
    pub fn with_default_servers(mut self, defaults: &[IceServer]) -> Self {
        if self.ice_servers.is_empty() {
            self.ice_servers = defaults.to_vec();
        }
        self
    }
}

/// Offer/answer and connection constraints (`RTCMediaConstraints`)
///
/// Values are kept as strings, the way the scripting side sends them
/// (`{"mandatory": {"IceRestart": "true"}, "optional": [...]}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    #[serde(default)]
    pub mandatory: HashMap<String, String>,

    #[serde(default)]
    pub optional: Vec<HashMap<String, String>>,
}

impl MediaConstraints {
    /// Boolean value of a constraint; mandatory entries win over optional ones
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.mandatory
            .get(name)
            .or_else(|| self.optional.iter().find_map(|entry| entry.get(name)))
            .and_then(|value| match value.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            })
    }

    /// Whether an ICE restart was requested
    pub fn ice_restart(&self) -> bool {
        self.flag("IceRestart").unwrap_or(false)
    }

    /// Whether voice activity detection is enabled (default: true)
    pub fn voice_activity_detection(&self) -> bool {
        self.flag("VoiceActivityDetection").unwrap_or(true)
    }
}

/// Camera selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

/// Detailed video request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<FacingMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
}

/// `video` member of the stream constraints: `true`/`false` or an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VideoRequest {
    Enabled(bool),
    Constrained(VideoConstraints),
}

impl Default for VideoRequest {
    fn default() -> Self {
        VideoRequest::Enabled(false)
    }
}

/// Local media request (`getUserMedia` constraints)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaStreamConstraints {
    #[serde(default)]
    pub audio: bool,

    #[serde(default)]
    pub video: VideoRequest,
}

impl MediaStreamConstraints {
    /// Audio and video, default camera
    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: VideoRequest::Enabled(true),
        }
    }

    /// Audio only
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: VideoRequest::Enabled(false),
        }
    }

    pub fn wants_audio(&self) -> bool {
        self.audio
    }

    pub fn wants_video(&self) -> bool {
        !matches!(self.video, VideoRequest::Enabled(false))
    }

    /// Requested camera, if any
    pub fn facing_mode(&self) -> Option<FacingMode> {
        match &self.video {
            VideoRequest::Constrained(video) => video.facing_mode,
            VideoRequest::Enabled(_) => None,
        }
    }

    /// A request must ask for at least one kind of media
    pub fn validate(&self) -> Result<()> {
        if !self.wants_audio() && !self.wants_video() {
            return Err(Error::InvalidConstraints(
                "at least one of audio or video must be requested".to_string(),
            ));
        }
        Ok(())
    }
}
