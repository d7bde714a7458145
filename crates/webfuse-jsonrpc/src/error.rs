//! Status codes and wire-visible errors.
//!
//! Every fallible operation in the adapter reports its outcome as a status;
//! nothing is raised out of band. Statuses that cross the wire travel as
//! JSON-RPC error objects (`{"code": …, "message": …, "data"?: …}`), and
//! codes supplied by the remote provider pass through unchanged.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type alias for adapter operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Success sentinel; never appears inside an error object.
pub const GOOD: i64 = 0;

/// Stable status taxonomy.
///
/// Protocol-shape violations use the standard JSON-RPC numbering; adapter
/// outcomes use small positive integers. Codes the adapter does not know
/// survive as [`ErrorCode::Other`] so remote errors round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Generic failure (mount failure, rejected credential, …).
    Bad,
    /// Reply or request shape invalid.
    BadFormat,
    /// Deadline exceeded.
    Timeout,
    /// Transport gone.
    ConnectionClosed,
    /// Proxy shutting down.
    ProxyDisposed,
    /// Target filesystem unknown.
    NoFilesystem,
    /// Top-level JSON-RPC malformed (-32600).
    InvalidRequest,
    /// Unknown method (-32601).
    MethodNotFound,
    /// Parameter arity or type mismatch (-32602).
    InvalidParams,
    /// Remote-supplied code passed through unchanged.
    Other(i64),
}

impl ErrorCode {
    /// The numeric code as it appears on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Bad => 1,
            Self::BadFormat => 2,
            Self::Timeout => 3,
            Self::ConnectionClosed => 4,
            Self::ProxyDisposed => 5,
            Self::NoFilesystem => 6,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Other(code) => code,
        }
    }

    /// The default human-readable message for this code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Bad => "operation failed",
            Self::BadFormat => "bad format",
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection closed",
            Self::ProxyDisposed => "proxy disposed",
            Self::NoFilesystem => "no such filesystem",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::Other(_) => "remote error",
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Bad,
            2 => Self::BadFormat,
            3 => Self::Timeout,
            4 => Self::ConnectionClosed,
            5 => Self::ProxyDisposed,
            6 => Self::NoFilesystem,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// A JSON-RPC error object as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric status code; see [`ErrorCode`] for the taxonomy.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail, passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an error with an explicit message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Generic failure.
    #[must_use]
    pub fn bad(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Bad, message)
    }

    /// Reply or request shape invalid.
    #[must_use]
    pub fn bad_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadFormat, message)
    }

    /// Deadline exceeded.
    #[must_use]
    pub fn timeout() -> Self {
        ErrorCode::Timeout.into()
    }

    /// Transport gone.
    #[must_use]
    pub fn connection_closed() -> Self {
        ErrorCode::ConnectionClosed.into()
    }

    /// Proxy shutting down.
    #[must_use]
    pub fn proxy_disposed() -> Self {
        ErrorCode::ProxyDisposed.into()
    }

    /// Target filesystem unknown.
    #[must_use]
    pub fn no_filesystem(filesystem: &str) -> Self {
        Self::new(
            ErrorCode::NoFilesystem,
            format!("no such filesystem: {filesystem}"),
        )
    }

    /// Top-level JSON-RPC malformed.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Unknown method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("method not found: {method}"))
    }

    /// Parameter arity or type mismatch.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// The taxonomy entry for this error's code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from(self.code)
    }
}

impl From<ErrorCode> for RpcError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}
