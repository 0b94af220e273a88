//! Common error types for Sidelink.

use thiserror::Error;

/// Result type alias using Sidelink's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a side-channel exchange failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCause {
    /// The request never produced a response (connect, timeout, TLS, ...).
    Network(String),
    /// The relay answered with a non-success status.
    Status { code: u16, message: String },
    /// The response body was not the expected JSON.
    Decode(String),
}

impl std::fmt::Display for TransportCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportCause::Network(msg) => write!(f, "network: {msg}"),
            TransportCause::Status { code, message } => write!(f, "status {code}: {message}"),
            TransportCause::Decode(msg) => write!(f, "decode: {msg}"),
        }
    }
}

/// A failed request/response exchange with the signaling relay.
///
/// Transport failures are ordinary return values: callers decide whether to
/// retry on the next tick or give up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error ({cause})")]
pub struct TransportError {
    pub cause: TransportCause,
}

impl TransportError {
    pub fn network(msg: impl std::fmt::Display) -> Self {
        Self {
            cause: TransportCause::Network(msg.to_string()),
        }
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self {
            cause: TransportCause::Status {
                code,
                message: message.into(),
            },
        }
    }

    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self {
            cause: TransportCause::Decode(msg.to_string()),
        }
    }
}

/// Top-level error type for Sidelink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Side-channel request failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Caller passed a placeholder or incomplete selection
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the session's current state
    #[error("cannot {action} while {state}")]
    InvalidState { state: String, action: &'static str },

    /// Peer-connection capability failed
    #[error("peer error: {0}")]
    Peer(String),

    /// Local media capability failed
    #[error("media error: {0}")]
    Media(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Work was cancelled before it completed
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error from any displayable type.
    pub fn validation(msg: impl std::fmt::Display) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Create a peer error from any displayable type.
    pub fn peer(msg: impl std::fmt::Display) -> Self {
        Self::Peer(msg.to_string())
    }

    /// Create a media error from any displayable type.
    pub fn media(msg: impl std::fmt::Display) -> Self {
        Self::Media(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a serialization error from any displayable type.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    pub fn invalid_state(state: impl std::fmt::Display, action: &'static str) -> Self {
        Self::InvalidState {
            state: state.to_string(),
            action,
        }
    }

    /// Whether the error came from the side channel (and is therefore worth retrying).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::status(500, "Offer must supply 'label'");
        assert_eq!(
            err.to_string(),
            "transport error (status 500: Offer must supply 'label')"
        );

        let err: Error = TransportError::network("connection refused").into();
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "transport error (network: connection refused)");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state("connected", "post an offer");
        assert_eq!(err.to_string(), "cannot post an offer while connected");
        assert!(!err.is_transport());
    }
}
