//! Error types for binrelay.
//!
//! Every routing failure a client can observe maps to the same JSON-RPC
//! application code; callers tell the cases apart by message text.

use crate::config::GatewayConfig;
use thiserror::Error;

/// Main error type for the gateway.
#[derive(Debug, Error)]
pub enum RelayError {
    // Registration errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Instance not found")]
    InstanceNotFound { key: String },

    // Routing errors
    #[error(
        "No IDA instance found for binary: {selector}. Use {} to see available binaries.",
        GatewayConfig::LIST_INSTANCES_TOOL
    )]
    NoMatchingInstance { selector: String },

    #[error(
        "Multiple IDA instances are connected. Please specify the '{}' parameter to select which one to use. Use {} to see available binaries.",
        GatewayConfig::SELECTOR_PARAM,
        GatewayConfig::LIST_INSTANCES_TOOL
    )]
    AmbiguousInstance { count: usize },

    // Transport errors
    #[error("Worker unreachable at {addr}: {message}")]
    Transport { addr: String, message: String },

    #[error("Request to {addr} timed out after {timeout:?}")]
    Timeout {
        addr: String,
        timeout: std::time::Duration,
    },

    #[error("Malformed reply from {addr}: {message}")]
    MalformedReply { addr: String, message: String },

    // Protocol errors
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Infrastructure errors
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

    #[error("Network error: {message}")]
    Network { message: String },
}

/// Result type alias for binrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Network {
            message: err.to_string(),
        }
    }
}

impl RelayError {
    /// Classify a failed worker call into the transport taxonomy.
    pub fn from_worker_call(addr: &str, timeout: std::time::Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout {
                addr: addr.to_string(),
                timeout,
            }
        } else if err.is_decode() {
            RelayError::MalformedReply {
                addr: addr.to_string(),
                message: err.to_string(),
            }
        } else {
            RelayError::Transport {
                addr: addr.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Whether the worker could not be reached or answered garbage.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::Transport { .. }
                | RelayError::Timeout { .. }
                | RelayError::MalformedReply { .. }
                | RelayError::Network { .. }
        )
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard codes are used for envelope problems; everything the router
    /// produces shares `GatewayConfig::ROUTING_ERROR_CODE` (-32000).
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            RelayError::Parse { .. } | RelayError::Json { .. } => -32700,
            RelayError::InvalidRequest { .. } => -32600,
            RelayError::MethodNotFound { .. } => -32601,
            RelayError::InvalidParams { .. } | RelayError::Validation { .. } => -32602,

            RelayError::InstanceNotFound { .. }
            | RelayError::NoMatchingInstance { .. }
            | RelayError::AmbiguousInstance { .. }
            | RelayError::Transport { .. }
            | RelayError::Timeout { .. }
            | RelayError::MalformedReply { .. }
            | RelayError::Network { .. } => GatewayConfig::ROUTING_ERROR_CODE,

            RelayError::Io { .. } => -32603,
        }
    }
}
