//! # Client Error Types
//!
//! Error types for register client operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Client Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transient     │  │     Permanent           │ │
//! │  │                 │  │   (retried)     │  │   (surfaced at once)    │ │
//! │  │  InvalidConfig  │  │  Transport      │  │  Rejected (4xx)         │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Decode                 │ │
//! │  │  ConfigLoad/Save│  │  Server (5xx)   │  │  Validation / Core      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Cache lifecycle: NotLoaded, InvalidTransition                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  NOT errors: "no active register" is Ok(None); data-quality issues     │
//! │  go to a DataQualitySink.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use till_core::{CoreError, ValidationError};

use crate::cache::CacheState;
use crate::retry::Retryable;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Client error type covering every failure a register operation can hit.
#[derive(Debug, Error)]
pub enum ClientError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid client configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API base URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transient Source Errors
    // =========================================================================
    /// The request never produced a response (DNS, connect, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The backend answered 5xx or 429.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    // =========================================================================
    // Permanent Errors
    // =========================================================================
    /// The backend rejected the request (4xx other than 429).
    #[error("Request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// A response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Caller input failed pre-submission checks.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A domain rule was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Cache Lifecycle Errors
    // =========================================================================
    /// The operation needs a loaded register.
    #[error("No register is loaded")]
    NotLoaded,

    /// The cache state machine does not allow this transition.
    #[error("Invalid cache transition from {from} to {to}")]
    InvalidTransition { from: CacheState, to: CacheState },
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::from_status(status.as_u16(), err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl ClientError {
    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            ClientError::Server { status, message }
        } else {
            ClientError::Rejected { status, message }
        }
    }

    /// Returns true if this error is transient and the call can be retried.
    ///
    /// ## Retryable Errors
    /// - Transport failures (network issues)
    /// - Timeouts
    /// - 5xx and 429 responses
    ///
    /// ## Non-Retryable Errors
    /// - 4xx rejections, decode failures
    /// - Validation and domain errors
    /// - Configuration and cache lifecycle errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Timeout | ClientError::Server { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidConfig(_)
                | ClientError::InvalidUrl(_)
                | ClientError::ConfigLoadFailed(_)
                | ClientError::ConfigSaveFailed(_)
        )
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        ClientError::is_retryable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(ClientError::Transport("connection reset".into()).is_retryable());
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::from_status(503, "unavailable").is_retryable());
        assert!(ClientError::from_status(429, "slow down").is_retryable());

        assert!(!ClientError::from_status(422, "bad amount").is_retryable());
        assert!(!ClientError::Decode("eof".into()).is_retryable());
        assert!(!ClientError::NotLoaded.is_retryable());
        assert!(!ClientError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ClientError::from_status(500, "boom"),
            ClientError::Server { status: 500, .. }
        ));
        assert!(matches!(
            ClientError::from_status(404, "missing"),
            ClientError::Rejected { status: 404, .. }
        ));
    }

    #[test]
    fn test_config_errors() {
        assert!(ClientError::InvalidUrl("x".into()).is_config_error());
        assert!(!ClientError::Timeout.is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::InvalidTransition {
            from: CacheState::Empty,
            to: CacheState::Loaded,
        };
        assert_eq!(err.to_string(), "Invalid cache transition from empty to loaded");

        let err: ClientError = ValidationError::Required {
            field: "concept".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Validation failed: concept is required");
    }
}
