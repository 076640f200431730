//! Request and reply envelopes
//!
//! Keyword arguments travel as base64-encoded JSON so they survive the
//! kernel transport as one opaque string. The reply payload is a JSON object
//! `{status, result, err_cls, err_message}`, possibly wrapped in one layer of
//! quotes when the kernel hands back the `repr` of a string.

use crate::error::RpcError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Request sent to the kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Remote function, `<module>.<name>`
    pub function: String,
    /// base64(JSON of the keyword-argument object)
    pub kwargs_encoded: String,
}

impl RpcRequest {
    /// Encode a request; `kwargs` must serialize to a JSON object
    pub fn new<K: Serialize + ?Sized>(function: &str, kwargs: &K) -> Result<Self, RpcError> {
        if function.is_empty() {
            return Err(RpcError::Validation("function name is empty".to_string()));
        }
        let value = serde_json::to_value(kwargs)?;
        let value = match value {
            Value::Null => Value::Object(serde_json::Map::new()),
            Value::Object(_) => value,
            other => {
                return Err(RpcError::Validation(format!(
                    "keyword arguments must be an object, got {other}"
                )))
            }
        };
        let json = serde_json::to_vec(&value)?;
        Ok(Self {
            function: function.to_string(),
            kwargs_encoded: STANDARD.encode(json),
        })
    }

    /// Decode the keyword arguments back to JSON
    pub fn kwargs(&self) -> Result<Value, RpcError> {
        let bytes = STANDARD
            .decode(&self.kwargs_encoded)
            .map_err(|e| RpcError::decode(e, self.kwargs_encoded.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| RpcError::decode(e, self.kwargs_encoded.clone()))
    }
}

/// Application-level status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcStatus {
    /// 0
    Ok,
    /// 1, remote capability missing
    ImportError,
    /// 2, remote call raised
    ExecutionError,
    /// Any other code
    Unknown(i64),
}

impl RpcStatus {
    /// Map a wire code to a status
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::ImportError,
            2 => Self::ExecutionError,
            other => Self::Unknown(other),
        }
    }

    /// Wire code
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::ImportError => 1,
            Self::ExecutionError => 2,
            Self::Unknown(code) => *code,
        }
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::ImportError => "ImportError",
            Self::ExecutionError => "ExecutionError",
            Self::Unknown(_) => "UnknownError",
        }
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded application-layer reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    /// Status code
    pub status: i64,
    /// Result on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Remote exception class
    #[serde(default)]
    pub err_cls: Option<String>,
    /// Remote exception message
    #[serde(default)]
    pub err_message: Option<String>,
}

impl RpcEnvelope {
    /// Successful envelope
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            status: 0,
            result: Some(result),
            err_cls: None,
            err_message: None,
        }
    }

    /// Failed envelope
    #[must_use]
    pub fn error(status: RpcStatus, class: &str, message: &str) -> Self {
        Self {
            status: status.code(),
            result: None,
            err_cls: Some(class.to_string()),
            err_message: Some(message.to_string()),
        }
    }

    /// Parse a reply payload
    ///
    /// Accepts the bare JSON object, the object wrapped in one layer of
    /// single or double quotes, or a JSON string literal holding it.
    pub fn parse(payload: &str) -> Result<Self, RpcError> {
        let trimmed = payload.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::String(inner)) => Self::from_json(&inner, payload),
            Ok(value) => {
                serde_json::from_value(value).map_err(|e| RpcError::decode(e, payload))
            }
            Err(err) => match strip_quotes(trimmed) {
                Some(inner) => Self::from_json(inner, payload),
                None => Err(RpcError::decode(err, payload)),
            },
        }
    }

    fn from_json(json: &str, payload: &str) -> Result<Self, RpcError> {
        serde_json::from_str(json).map_err(|e| RpcError::decode(e, payload))
    }

    /// Classified status
    #[inline]
    #[must_use]
    pub fn rpc_status(&self) -> RpcStatus {
        RpcStatus::from_code(self.status)
    }

    /// Result on status 0, classified error otherwise
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.rpc_status() {
            RpcStatus::Ok => Ok(self.result.unwrap_or(Value::Null)),
            status => Err(RpcError::Remote {
                status,
                class: self.err_cls,
                message: self.err_message,
            }),
        }
    }
}

fn strip_quotes(s: &str) -> Option<&str> {
    ['\'', '"']
        .into_iter()
        .find_map(|q| s.strip_prefix(q)?.strip_suffix(q))
}
