//! Kernel transport seam
//!
//! A transport executes one [`RpcRequest`] inside the kernel and hands back
//! the transport-level status plus the raw text of the reply payload.

use crate::envelope::RpcRequest;
use crate::error::RpcError;
use async_trait::async_trait;

/// Transport status meaning the kernel executed the call
pub const STATUS_OK: &str = "ok";

/// Raw kernel reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelReply {
    /// Transport status, `ok` or an error name
    pub status: String,
    /// Payload text (`text/plain` of the evaluated result)
    pub data: String,
}

impl KernelReply {
    /// Reply for an executed call
    #[must_use]
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            data: data.into(),
        }
    }

    /// Reply for a call the kernel failed to execute
    #[must_use]
    pub fn failed(status: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            data: data.into(),
        }
    }

    /// Whether the transport status is `ok`
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Executes RPC requests inside the kernel
#[async_trait]
pub trait KernelTransport: Send + Sync {
    /// Run one request
    ///
    /// An `Err` means the request never reached the kernel; it is treated
    /// the same as a non-`ok` reply.
    async fn execute(&self, request: &RpcRequest) -> Result<KernelReply, RpcError>;
}
