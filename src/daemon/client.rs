//! Blocking client for the screening daemon.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::protocol::{
    ErrorCode, FramedMessage, HealthStatus, MAX_FRAME_BYTES, PROTOCOL_VERSION, ReloadResponse,
    Request, Response, StatusResponse, decode_message, default_socket_path, encode_message,
};
use crate::service::{RawQuery, SearchResponse};

/// Errors surfaced to daemon callers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request (status {status}): {message}")]
    InvalidInput { status: u16, message: String },

    #[error("daemon busy (status {status}): {message}")]
    Overloaded { status: u16, message: String },

    #[error("daemon error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// HTTP-style status for the failure; 0 when the daemon never answered.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidInput { status, .. }
            | Self::Overloaded { status, .. }
            | Self::Server { status, .. } => *status,
            Self::Timeout(_) => 504,
            Self::Unavailable(_) | Self::Protocol(_) => 0,
        }
    }
}

/// Configuration for the daemon client.
#[derive(Debug, Clone)]
pub struct DaemonClientConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,
    /// Socket read/write timeout.
    pub request_timeout: Duration,
}

impl Default for DaemonClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DaemonClientConfig {
    /// Load config from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = dotenvy::var("WSCREEN_SOCKET") {
            cfg.socket_path = PathBuf::from(path);
        }

        if let Ok(val) = dotenvy::var("WSCREEN_CLIENT_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            cfg.request_timeout = Duration::from_millis(ms);
        }

        cfg
    }
}

/// Unix Domain Socket client for the screening daemon.
///
/// Keeps one connection open and reconnects once if it turns out to be stale.
pub struct UdsDaemonClient {
    config: DaemonClientConfig,
    connection: Mutex<Option<UnixStream>>,
    request_counter: AtomicU64,
}

impl UdsDaemonClient {
    pub fn new(config: DaemonClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            request_counter: AtomicU64::new(0),
        }
    }

    /// Create a client with configuration from the environment.
    pub fn with_defaults() -> Self {
        Self::new(DaemonClientConfig::from_env())
    }

    fn connect(&self) -> Result<UnixStream, ClientError> {
        let stream = UnixStream::connect(&self.config.socket_path).map_err(|e| {
            ClientError::Unavailable(format!(
                "cannot connect to {}: {}",
                self.config.socket_path.display(),
                e
            ))
        })?;
        stream
            .set_read_timeout(Some(self.config.request_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.config.request_timeout)))
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;
        debug!(socket = %self.config.socket_path.display(), "Connected to daemon");
        Ok(stream)
    }

    /// Send a request and receive a response.
    fn send_request(&self, request: Request) -> Result<Response, ClientError> {
        let request_id = format!(
            "wscreen-{}",
            self.request_counter.fetch_add(1, Ordering::Relaxed)
        );
        let msg = FramedMessage::new(&request_id, request);
        let encoded = encode_message(&msg).map_err(|e| ClientError::Protocol(e.to_string()))?;

        let mut guard = self.connection.lock();
        let reused = guard.is_some();
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };

        let response = match roundtrip(&mut stream, &encoded) {
            Ok(resp) => resp,
            Err(RoundtripError::Io(e)) if reused => {
                debug!(error = %e, "Stale daemon connection, reconnecting");
                stream = self.connect()?;
                roundtrip(&mut stream, &encoded).map_err(RoundtripError::into_client)?
            }
            Err(e) => return Err(e.into_client()),
        };
        *guard = Some(stream);
        drop(guard);

        let response: FramedMessage<Response> =
            decode_message(&response).map_err(|e| ClientError::Protocol(e.to_string()))?;

        if response.version != PROTOCOL_VERSION {
            return Err(ClientError::Protocol(format!(
                "protocol version mismatch: expected {}, got {}",
                PROTOCOL_VERSION, response.version
            )));
        }

        match response.payload {
            Response::Error(err) => Err(match err.code {
                ErrorCode::InvalidInput | ErrorCode::VersionMismatch => ClientError::InvalidInput {
                    status: err.status,
                    message: err.message,
                },
                ErrorCode::Overloaded => ClientError::Overloaded {
                    status: err.status,
                    message: err.message,
                },
                ErrorCode::Timeout => ClientError::Timeout(err.message),
                _ => ClientError::Server {
                    status: err.status,
                    message: err.message,
                },
            }),
            other => Ok(other),
        }
    }

    pub fn health(&self) -> Result<HealthStatus, ClientError> {
        match self.send_request(Request::Health)? {
            Response::Health(status) => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    pub fn search(
        &self,
        query: RawQuery,
        timeout: Option<Duration>,
    ) -> Result<SearchResponse, ClientError> {
        let request = Request::Search {
            query,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        };
        match self.send_request(request)? {
            Response::Search(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    pub fn reload(&self) -> Result<ReloadResponse, ClientError> {
        match self.send_request(Request::Reload)? {
            Response::Reloaded(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    pub fn status(&self) -> Result<StatusResponse, ClientError> {
        match self.send_request(Request::Status)? {
            Response::Status(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    /// Request daemon shutdown.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        match self.send_request(Request::Shutdown)? {
            Response::Shutdown { .. } => {
                *self.connection.lock() = None;
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }
}

enum RoundtripError {
    Io(std::io::Error),
    Protocol(String),
}

impl RoundtripError {
    fn into_client(self) -> ClientError {
        match self {
            Self::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                ClientError::Timeout("response timeout".to_string())
            }
            Self::Io(e) => ClientError::Unavailable(e.to_string()),
            Self::Protocol(msg) => ClientError::Protocol(msg),
        }
    }
}

fn roundtrip(stream: &mut UnixStream, encoded: &[u8]) -> Result<Vec<u8>, RoundtripError> {
    stream.write_all(encoded).map_err(RoundtripError::Io)?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).map_err(RoundtripError::Io)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(RoundtripError::Protocol(format!(
            "response too large: {} bytes",
            len
        )));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).map_err(RoundtripError::Io)?;
    Ok(payload)
}

fn unexpected(response: &Response) -> ClientError {
    ClientError::Protocol(format!("unexpected response: {:?}", response))
}
