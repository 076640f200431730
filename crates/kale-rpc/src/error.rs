//! Error types for kernel RPC
//!
//! Each variant maps onto one failure class a caller can branch on:
//! - the kernel did not execute the call
//! - the reply payload is not the expected JSON
//! - the remote function failed to import or raised
//! - the request was rejected locally before being sent

use crate::envelope::RpcStatus;

/// Failure class of an RPC call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Kernel did not execute the call
    Transport,
    /// Reply payload could not be decoded
    Decode,
    /// Remote capability missing
    RemoteImport,
    /// Remote call raised
    RemoteExecution,
    /// Rejected locally before any remote call
    Validation,
}

/// Main RPC error type
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level status was not `ok`
    #[error("kernel failed during code execution (status: {status})")]
    Transport {
        /// Transport status
        status: String,
        /// Raw transport output
        output: String,
    },

    /// Payload is not valid JSON or does not match the expected shape
    #[error("failed to parse response: {message}")]
    Decode {
        /// Parser message
        message: String,
        /// Raw payload
        payload: String,
    },

    /// Remote function reported a failure
    #[error("remote {status} failure: {}", .class.as_deref().unwrap_or("unknown"))]
    Remote {
        /// Application status
        status: RpcStatus,
        /// Remote exception class
        class: Option<String>,
        /// Remote exception message
        message: Option<String>,
    },

    /// Request rejected before being sent
    #[error("invalid request: {0}")]
    Validation(String),

    /// Keyword arguments could not be serialized
    #[error("failed to encode arguments: {0}")]
    Encode(#[from] serde_json::Error),

    /// Spawning or talking to the kernel process failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Failure class of this error
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Transport { .. } | Self::Io(_) => FailureClass::Transport,
            Self::Decode { .. } => FailureClass::Decode,
            Self::Remote {
                status: RpcStatus::ImportError,
                ..
            } => FailureClass::RemoteImport,
            Self::Remote { .. } => FailureClass::RemoteExecution,
            Self::Validation(_) | Self::Encode(_) => FailureClass::Validation,
        }
    }

    /// Build a decode error from a parser error and the raw payload
    pub(crate) fn decode(err: impl std::fmt::Display, payload: impl Into<String>) -> Self {
        Self::Decode {
            message: err.to_string(),
            payload: payload.into(),
        }
    }
}
