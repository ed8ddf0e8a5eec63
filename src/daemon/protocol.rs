//! Wire protocol for the screening daemon.
//!
//! Frames are a 4-byte big-endian length followed by a MessagePack-encoded
//! [`FramedMessage`]. Error responses carry an HTTP-style `status` so a thin
//! HTTP gateway can forward them unchanged: 400 for caller mistakes, 5xx for
//! server-side failures.

use serde::{Deserialize, Serialize};

use crate::service::{RawQuery, SearchError, SearchResponse, ServiceStats};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are refused by both ends.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Default socket path, one per user.
pub fn default_socket_path() -> std::path::PathBuf {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".into());
    // Sanitize: keep only alphanumeric, dash, underscore to prevent path traversal
    let safe_user: String = user
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    let safe_user = if safe_user.is_empty() {
        "unknown".to_string()
    } else {
        safe_user
    };
    std::path::PathBuf::from(format!("/tmp/wscreen-{}.sock", safe_user))
}

/// Request types for the daemon protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Health check - returns daemon status.
    Health,

    /// Screen a name against the current index.
    Search {
        query: RawQuery,
        /// Caller deadline; the daemon default applies when absent.
        timeout_ms: Option<u64>,
    },

    /// Re-read the records file and atomically swap the index.
    Reload,

    /// Get daemon status and counters.
    Status,

    /// Request graceful shutdown.
    Shutdown,
}

/// Response types from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Health(HealthStatus),

    Search(SearchResponse),

    Reloaded(ReloadResponse),

    Status(StatusResponse),

    /// Shutdown acknowledgement.
    Shutdown { message: String },

    Error(ErrorResponse),
}

/// Health status of the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Daemon uptime in seconds.
    pub uptime_secs: u64,
    /// Protocol version.
    pub version: u32,
    /// Whether an index is installed and queries can run.
    pub ready: bool,
    /// Current memory usage in bytes (approximate).
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub epoch: u64,
    pub records: usize,
    pub elapsed_ms: u64,
}

/// Daemon status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub version: u32,
    pub index_epoch: u64,
    pub index_records: usize,
    /// Build time of the current index (unix millis).
    pub index_built_at_ms: Option<i64>,
    pub service: ServiceStats,
    pub memory_bytes: u64,
    /// Total requests served.
    pub total_requests: u64,
    pub active_connections: u64,
}

/// Error response from daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// HTTP status equivalent.
    pub status: u16,
    /// Human-readable error message.
    pub message: String,
    /// Whether the request can be retried.
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: code.status(),
            message: message.into(),
            retryable: code.retryable(),
        }
    }
}

impl From<&SearchError> for ErrorResponse {
    fn from(err: &SearchError) -> Self {
        let code = match err {
            SearchError::MissingName
            | SearchError::EmptyName(_)
            | SearchError::InvalidLimit(_)
            | SearchError::InvalidMinMatch(_) => ErrorCode::InvalidInput,
            SearchError::IndexUnavailable => ErrorCode::IndexUnavailable,
            SearchError::Overloaded(_) => ErrorCode::Overloaded,
            SearchError::Timeout(_) => ErrorCode::Timeout,
            SearchError::Internal(_) => ErrorCode::Internal,
        };
        Self {
            code,
            status: err.status_code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Error codes for daemon errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unknown or internal error.
    Internal,
    /// Invalid request parameters.
    InvalidInput,
    /// No index loaded yet.
    IndexUnavailable,
    /// Concurrency ceiling full, try again later.
    Overloaded,
    /// Request timed out.
    Timeout,
    /// Reloading the records file failed.
    ReloadFailed,
    /// Protocol version mismatch.
    VersionMismatch,
}

impl ErrorCode {
    pub fn status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::VersionMismatch => 400,
            Self::IndexUnavailable | Self::Overloaded => 503,
            Self::Timeout => 504,
            Self::Internal | Self::ReloadFailed => 500,
        }
    }

    pub fn retryable(self) -> bool {
        !matches!(self, Self::InvalidInput | Self::VersionMismatch)
    }
}

/// Framed message wrapper for length-prefixed protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramedMessage<T> {
    /// Protocol version.
    pub version: u32,
    /// Request ID for correlation.
    pub request_id: String,
    /// Payload.
    pub payload: T,
}

impl<T> FramedMessage<T> {
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request_id: request_id.into(),
            payload,
        }
    }
}

/// Encode a message to MessagePack bytes with length prefix.
pub fn encode_message<T: Serialize>(msg: &FramedMessage<T>) -> Result<Vec<u8>, EncodeError> {
    let payload = rmp_serde::to_vec_named(msg).map_err(|e| EncodeError(e.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(EncodeError(format!(
            "frame of {} bytes exceeds {} byte limit",
            payload.len(),
            MAX_FRAME_BYTES
        )));
    }
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from MessagePack bytes (without length prefix).
pub fn decode_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<FramedMessage<T>, DecodeError> {
    rmp_serde::from_slice(data).map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("encode error: {0}")]
pub struct EncodeError(pub String);

#[derive(Debug, Clone, thiserror::Error)]
#[error("decode error: {0}")]
pub struct DecodeError(pub String);
