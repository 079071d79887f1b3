//! Error Types
//!
//! Only transport failures abort a turn. Frame parse failures are local to
//! one frame, side-effect failures are local to that side effect.

use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to the backend on the main stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if it could be read
        body: String,
    },

    /// The request never got a response (DNS, connect, TLS, ...)
    #[error("Network failure: {0}")]
    Network(String),

    /// The response body broke off while streaming
    #[error("Stream interrupted: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// A single frame could not be decoded
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameParseError {
    /// The payload line is not valid JSON
    #[error("Invalid JSON in frame payload: {0}")]
    InvalidJson(String),

    /// The payload is valid JSON but not an object
    #[error("Frame payload is not a JSON object")]
    NotAnObject,
}

/// Failure of an out-of-band call (references, feedback, audio)
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SideEffectError {
    /// The side channel request failed at the transport level
    #[error("Side channel transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The side channel answered with something we could not decode
    #[error("Failed to decode side channel response: {0}")]
    Decode(String),

    /// The backend processed the request and refused it
    #[error("Request rejected: {message}")]
    Rejected {
        /// Reason given by the backend
        message: String,
    },

    /// Audio could not be played by the surface
    #[error("Audio playback failed: {0}")]
    Playback(String),
}

impl From<reqwest::Error> for SideEffectError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(TransportError::Network(e.to_string()))
        }
    }
}

/// Reasons a turn could not be started
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Another turn is still in flight on this conversation
    #[error("A turn is already in flight for this conversation")]
    Busy,

    /// Nothing to send after trimming
    #[error("Prompt is empty")]
    EmptyPrompt,
}

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Status {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned 503: overloaded");
    }

    #[test]
    fn test_side_effect_wraps_transport() {
        let err: SideEffectError = TransportError::Network("refused".to_string()).into();
        assert!(matches!(err, SideEffectError::Transport(_)));
        assert!(err.to_string().contains("refused"));
    }
}
