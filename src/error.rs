//! Error types for the splashcup-link crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The push channel could not be opened or failed while open.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the transport failure.
        reason: String,
    },

    /// The push channel was closed by the device.
    #[error("Connection lost")]
    ConnectionLost,

    /// Operation requires an open push channel but the link is not open.
    #[error("Device link not open")]
    NotConnected,

    /// An inbound payload could not be decoded.
    #[error("Could not decode message: {context}")]
    Decode {
        /// Description of what was wrong with the payload.
        context: String,
    },

    /// Persisted registry data failed structural validation.
    #[error("Invalid stored data: {context}")]
    Validation {
        /// Description of the validation failure.
        context: String,
    },

    /// A point-channel request failed.
    #[error("Request failed: {reason}")]
    Request {
        /// Human-readable reason, suitable for display.
        reason: String,
    },

    /// A point-channel request did not complete in time.
    #[error("Device did not answer in time")]
    Timeout,

    /// No drink with the given tag uid exists in the registry.
    #[error("Drink not found: {uid}")]
    DrinkNotFound {
        /// The uid that was searched for.
        uid: String,
    },

    /// Reading or writing persisted state failed.
    #[error("Storage error: {reason}")]
    Storage {
        /// Description of the storage failure.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether trying the same operation again could succeed.
    ///
    /// Transport and request failures depend on the device being reachable;
    /// decode, validation and parameter errors will fail the same way again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::ConnectionLost
                | Self::NotConnected
                | Self::Request { .. }
                | Self::Timeout
                | Self::Storage { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            context: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }

        let reason = if err.is_connect() {
            "cannot reach the device".to_string()
        } else if let Some(status) = err.status() {
            format!("device answered {}", status)
        } else if err.is_decode() {
            "device sent an unreadable answer".to_string()
        } else {
            err.to_string()
        };

        Self::Request { reason }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionLost,
            other => Self::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
