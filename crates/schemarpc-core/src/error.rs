//! Error types for schemarpc.
//!
//! Startup errors (`Schema`, `Bind`, `Config`, registration-time
//! `UnknownMethod`) are fatal to the owning process. Everything else is a
//! per-call failure returned to the caller or connection that triggered it.

use std::time::Duration;
use thiserror::Error;

/// Main error type for schemarpc.
#[derive(Debug, Error)]
pub enum RpcError {
    // Startup errors
    #[error("Schema error: {message}")]
    Schema { message: String },

    #[error("Failed to bind {addr}: {message}")]
    Bind {
        addr: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // Method resolution errors
    #[error("Unknown method: {service}/{method}")]
    UnknownMethod { service: String, method: String },

    #[error("Method not implemented: {service}/{method}")]
    MethodNotImplemented { service: String, method: String },

    // Per-call errors
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// Failure signalled explicitly by a handler.
    #[error("{message} (code {code})")]
    Application { code: i32, message: String },

    /// Failure response received from the server.
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Low-level errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for schemarpc operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Create a failure a handler can return to its caller.
    pub fn application(code: i32, message: impl Into<String>) -> Self {
        RpcError::Application {
            code,
            message: message.into(),
        }
    }

    /// Create a transport error carrying the underlying IO error.
    pub fn transport(message: impl Into<String>, source: std::io::Error) -> Self {
        RpcError::Transport {
            message: format!("{}: {}", message.into(), source),
            source: Some(source),
        }
    }

    /// Convert to a wire error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error (frame is not a request)
    /// - -32601: Method not found (unknown or not implemented)
    /// - -32602: Invalid params (payload does not match the request shape)
    /// - -32603: Internal error
    ///
    /// Custom error codes:
    /// - -32000: Transport/connectivity error
    /// - -32001: Timeout
    ///
    /// Application and remote errors keep the code they carry.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            RpcError::Json { .. } => -32700,

            RpcError::UnknownMethod { .. } | RpcError::MethodNotImplemented { .. } => -32601,

            RpcError::Decode { .. } | RpcError::Validation { .. } => -32602,

            RpcError::Transport { .. } | RpcError::Io { .. } => -32000,

            RpcError::Timeout(_) => -32001,

            RpcError::Application { code, .. } | RpcError::Remote { code, .. } => *code,

            // All other errors are internal errors
            _ => -32603,
        }
    }

    /// Message sent to the peer in a failure response.
    ///
    /// Application errors travel verbatim, everything else uses the
    /// display form.
    pub fn to_wire_message(&self) -> String {
        match self {
            RpcError::Application { message, .. } | RpcError::Remote { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}
