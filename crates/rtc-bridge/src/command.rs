//! JSON command envelope
//!
//! The host glue forwards scripting-side calls as
//! `{"method": "createOffer", "params": {...}}` and returns a [`Response`].

use crate::bridge::RtcBridge;
use crate::config::{MediaConstraints, MediaStreamConstraints, RtcConfiguration};
use crate::engine::{IceCandidate, RtcEngine, SessionDescription};
use crate::error::ErrorCode;
use crate::registry::Handle;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A call from the scripting side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Command {
    FinishLoading,

    GetUserMedia {
        constraints: MediaStreamConstraints,
    },

    StopUserMedia,

    #[serde(rename_all = "camelCase")]
    CreatePeerConnection {
        #[serde(default)]
        configuration: RtcConfiguration,
        #[serde(default)]
        constraints: MediaConstraints,
    },

    #[serde(rename_all = "camelCase")]
    CreateLocalStream {
        peer_connection: Handle,
        constraints: MediaStreamConstraints,
    },

    #[serde(rename_all = "camelCase")]
    AddIceCandidate {
        peer_connection: Handle,
        candidate: IceCandidate,
    },

    #[serde(rename_all = "camelCase")]
    AddStream {
        peer_connection: Handle,
        stream: Handle,
    },

    #[serde(rename_all = "camelCase")]
    RemoveStream {
        peer_connection: Handle,
        stream: Handle,
    },

    #[serde(rename_all = "camelCase")]
    CreateOffer {
        peer_connection: Handle,
        #[serde(default)]
        constraints: MediaConstraints,
    },

    #[serde(rename_all = "camelCase")]
    CreateAnswer {
        peer_connection: Handle,
        #[serde(default)]
        constraints: MediaConstraints,
    },

    #[serde(rename_all = "camelCase")]
    SetLocalDescription {
        peer_connection: Handle,
        description: SessionDescription,
    },

    #[serde(rename_all = "camelCase")]
    SetRemoteDescription {
        peer_connection: Handle,
        description: SessionDescription,
    },

    #[serde(rename_all = "camelCase")]
    SetConfiguration {
        peer_connection: Handle,
        configuration: RtcConfiguration,
    },

    #[serde(rename_all = "camelCase")]
    Close { peer_connection: Handle },

    TrackSetEnabled { track: Handle, enabled: bool },

    Dispose { handle: Handle },

    StreamInfo { stream: Handle },

    TrackInfo { track: Handle },
}

impl Command {
    /// Method name, for logging
    pub fn method(&self) -> &'static str {
        match self {
            Command::FinishLoading => "finishLoading",
            Command::GetUserMedia { .. } => "getUserMedia",
            Command::StopUserMedia => "stopUserMedia",
            Command::CreatePeerConnection { .. } => "createPeerConnection",
            Command::CreateLocalStream { .. } => "createLocalStream",
            Command::AddIceCandidate { .. } => "addIceCandidate",
            Command::AddStream { .. } => "addStream",
            Command::RemoveStream { .. } => "removeStream",
            Command::CreateOffer { .. } => "createOffer",
            Command::CreateAnswer { .. } => "createAnswer",
            Command::SetLocalDescription { .. } => "setLocalDescription",
            Command::SetRemoteDescription { .. } => "setRemoteDescription",
            Command::SetConfiguration { .. } => "setConfiguration",
            Command::Close { .. } => "close",
            Command::TrackSetEnabled { .. } => "trackSetEnabled",
            Command::Dispose { .. } => "dispose",
            Command::StreamInfo { .. } => "streamInfo",
            Command::TrackInfo { .. } => "trackInfo",
        }
    }
}

/// Outcome of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Ok {
        #[serde(default)]
        result: Value,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl From<Result<Value>> for Response {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(result) => Response::Ok { result },
            Err(err) => Response::Error {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

impl<E: RtcEngine> RtcBridge<E> {
    /// Execute one command
    pub async fn dispatch(&self, command: Command) -> Result<Value> {
        debug!(method = command.method(), "Dispatching command");

        let value = match command {
            Command::FinishLoading => {
                self.finish_loading().await;
                Value::Null
            }
            Command::GetUserMedia { constraints } => {
                serde_json::to_value(self.get_user_media(&constraints).await?)?
            }
            Command::StopUserMedia => Value::from(self.stop_user_media().await),
            Command::CreatePeerConnection {
                configuration,
                constraints,
            } => serde_json::to_value(
                self.create_peer_connection(configuration, &constraints)
                    .await?,
            )?,
            Command::CreateLocalStream {
                peer_connection,
                constraints,
            } => serde_json::to_value(
                self.create_local_stream(&peer_connection, &constraints)
                    .await?,
            )?,
            Command::AddIceCandidate {
                peer_connection,
                candidate,
            } => {
                self.add_ice_candidate(&peer_connection, candidate).await?;
                Value::Null
            }
            Command::AddStream {
                peer_connection,
                stream,
            } => {
                self.add_stream(&peer_connection, &stream).await?;
                Value::Null
            }
            Command::RemoveStream {
                peer_connection,
                stream,
            } => {
                self.remove_stream(&peer_connection, &stream).await?;
                Value::Null
            }
            Command::CreateOffer {
                peer_connection,
                constraints,
            } => serde_json::to_value(self.create_offer(&peer_connection, &constraints).await?)?,
            Command::CreateAnswer {
                peer_connection,
                constraints,
            } => serde_json::to_value(self.create_answer(&peer_connection, &constraints).await?)?,
            Command::SetLocalDescription {
                peer_connection,
                description,
            } => {
                self.set_local_description(&peer_connection, description)
                    .await?;
                Value::Null
            }
            Command::SetRemoteDescription {
                peer_connection,
                description,
            } => {
                self.set_remote_description(&peer_connection, description)
                    .await?;
                Value::Null
            }
            Command::SetConfiguration {
                peer_connection,
                configuration,
            } => {
                self.set_configuration(&peer_connection, configuration)
                    .await?;
                Value::Null
            }
            Command::Close { peer_connection } => {
                self.close(&peer_connection).await;
                Value::Null
            }
            Command::TrackSetEnabled { track, enabled } => {
                self.track_set_enabled(&track, enabled)?;
                Value::Null
            }
            Command::Dispose { handle } => Value::from(self.dispose(&handle).await),
            Command::StreamInfo { stream } => serde_json::to_value(self.stream_info(&stream)?)?,
            Command::TrackInfo { track } => serde_json::to_value(self.track_info(&track)?)?,
        };

        Ok(value)
    }

    /// Parse, execute and answer a JSON-encoded command
    pub async fn handle_json(&self, request: &str) -> Result<String> {
        let response: Response = match serde_json::from_str::<Command>(request) {
            Ok(command) => self.dispatch(command).await.into(),
            Err(e) => Err::<Value, _>(Error::InvalidData(format!("Malformed command: {}", e))).into(),
        };
        Ok(serde_json::to_string(&response)?)
    }
}
