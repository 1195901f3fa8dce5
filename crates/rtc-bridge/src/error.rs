//! Error types for the RTC bridge

use crate::registry::{Handle, ObjectKind};
use serde::{Deserialize, Serialize};

/// Result type alias using the bridge Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bridge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Handle is not registered (never minted, or already released)
    #[error("Unknown {kind} handle: {handle}")]
    UnknownHandle {
        /// Table the lookup was made against
        kind: ObjectKind,
        /// The handle that failed to resolve
        handle: Handle,
    },

    /// Handle is already bound to a live object.
    ///
    /// Handles are minted by the registry itself, so this means the minting
    /// path is broken. It is logged at error level where it is raised.
    #[error("Duplicate handle: {0}")]
    DuplicateHandle(Handle),

    /// The RTC library rejected an operation
    #[error("RTC library error ({code}): {message}")]
    Library {
        /// Library-specific diagnostic code
        code: String,
        /// Library diagnostic message
        message: String,
    },

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Media constraints cannot be satisfied
    #[error("Invalid constraints: {0}")]
    InvalidConstraints(String),

    /// Malformed session description or ICE candidate
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an unknown-handle error
    pub fn unknown(kind: ObjectKind, handle: &Handle) -> Self {
        Error::UnknownHandle {
            kind,
            handle: handle.clone(),
        }
    }

    /// Create a library error from a diagnostic code and message
    pub fn library(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Library {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if this error is the expected "stale or unknown handle" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::UnknownHandle { .. })
    }

    /// Check if this error originated in the RTC library
    pub fn is_library_error(&self) -> bool {
        matches!(self, Error::Library { .. } | Error::Other(_))
    }

    /// Check if this error is a configuration or constraints error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_) | Error::InvalidConstraints(_)
        )
    }

    /// Get the wire code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::UnknownHandle { .. } => ErrorCode::UnknownHandle,
            Error::Library { .. } | Error::Other(_) => ErrorCode::LibraryError,
            Error::InvalidConfig(_) => ErrorCode::ConfigError,
            Error::InvalidConstraints(_) => ErrorCode::ConstraintsError,
            Error::InvalidData(_) | Error::SerializationError(_) => ErrorCode::InvalidData,
            Error::DuplicateHandle(_) | Error::InternalError(_) => ErrorCode::InternalError,
        }
    }
}

/// Error codes presented to the scripting side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Handle not registered
    UnknownHandle,
    /// RTC library failure
    LibraryError,
    /// Invalid configuration
    ConfigError,
    /// Unsatisfiable media constraints
    ConstraintsError,
    /// Malformed payload
    InvalidData,
    /// Internal error
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::UnknownHandle => write!(f, "UNKNOWN_HANDLE"),
            ErrorCode::LibraryError => write!(f, "LIBRARY_ERROR"),
            ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
            ErrorCode::ConstraintsError => write!(f, "CONSTRAINTS_ERROR"),
            ErrorCode::InvalidData => write!(f, "INVALID_DATA"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}
