//! Error types for client registration, resolution and construction.

use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for clientforge operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors raised while registering, resolving or constructing HTTP clients.
///
/// Registration-time failures are always [`ClientError::InvalidArgument`] and are
/// reported before any state is touched. The remaining variants surface later,
/// from the provider or from the transport collaborators.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// A registration argument was rejected
    #[error("Invalid argument `{parameter}`: {message}")]
    InvalidArgument {
        /// Name of the offending parameter
        parameter: &'static str,
        /// Why the value was rejected
        message: String,
    },

    /// No service is registered for the requested role
    #[error("No service registered for role `{role}`")]
    ServiceNotRegistered {
        /// Type name of the role
        role: &'static str,
    },

    /// A registered service could not be produced
    #[error("Failed to resolve `{role}`: {message}")]
    Resolution {
        /// Type name of the role
        role: &'static str,
        /// Failure details
        message: String,
    },

    /// The request URI could not be formed from the client's base address
    #[error("Invalid request URI `{uri}`: {message}")]
    InvalidRequestUri {
        /// The URI or path that was supplied
        uri: String,
        /// Failure details
        message: String,
    },

    /// A delegating handler failed
    #[error("Handler error: {message}")]
    Handler {
        /// Failure details
        message: String,
    },

    /// Error from the underlying HTTP transport
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    /// Unsupported configuration file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Configuration(#[from] config::ConfigError),

    /// The tracing subscriber could not be installed
    #[error("Logging initialization failed: {message}")]
    Logging {
        /// Failure details
        message: String,
    },
}

impl ClientError {
    /// Create an invalid argument error
    pub fn invalid_argument(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            message: message.into(),
        }
    }

    /// Create a missing service error
    pub fn service_not_registered(role: &'static str) -> Self {
        Self::ServiceNotRegistered { role }
    }

    /// Create a resolution error
    pub fn resolution(role: &'static str, message: impl Into<String>) -> Self {
        Self::Resolution {
            role,
            message: message.into(),
        }
    }

    /// Create an invalid request URI error
    pub fn invalid_request_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequestUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create a logging initialization error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    /// Returns `true` for registration-time argument errors
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Name of the rejected parameter, if this is an argument error
    pub fn parameter(&self) -> Option<&'static str> {
        match self {
            Self::InvalidArgument { parameter, .. } => Some(*parameter),
            _ => None,
        }
    }
}
