//! Daemon server core for the screening daemon.
//!
//! Listens on a Unix Domain Socket and answers search, reload and status
//! requests against a shared [`SearchService`]. Each accepted connection gets
//! its own thread; the service's concurrency ceiling, not the connection
//! count, bounds how many scans run at once.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::protocol::{
    ErrorCode, ErrorResponse, FramedMessage, HealthStatus, MAX_FRAME_BYTES, PROTOCOL_VERSION,
    ReloadResponse, Request, Response, StatusResponse, decode_message, encode_message,
};
use super::resource::ResourceMonitor;
use crate::config::DaemonConfig;
use crate::index::load_jsonl;
use crate::service::SearchService;

/// Daemon server state.
pub struct ScreenDaemon {
    config: DaemonConfig,
    service: Arc<SearchService>,
    resources: ResourceMonitor,
    start_time: Instant,
    total_requests: AtomicU64,
    active_connections: AtomicU64,
    shutdown: AtomicBool,
    last_activity: RwLock<Instant>,
}

impl ScreenDaemon {
    pub fn new(config: DaemonConfig, service: Arc<SearchService>) -> Self {
        Self {
            config,
            service,
            resources: ResourceMonitor::new(),
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    pub fn service(&self) -> &Arc<SearchService> {
        &self.service
    }

    /// Get current uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if daemon should shutdown due to idle timeout.
    fn should_shutdown_idle(&self) -> bool {
        if self.config.idle_timeout.is_zero() {
            return false;
        }
        let last = *self.last_activity.read();
        last.elapsed() > self.config.idle_timeout
    }

    /// Update last activity timestamp.
    fn touch_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Re-read the configured records file and install it as the current index.
    pub fn reload(&self) -> Result<ReloadResponse, ErrorResponse> {
        let Some(path) = self.config.records_path.as_deref() else {
            return Err(ErrorResponse::new(
                ErrorCode::ReloadFailed,
                "no records file configured",
            ));
        };

        let start = Instant::now();
        let index = load_jsonl(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "watchlist reload failed");
            ErrorResponse::new(ErrorCode::ReloadFailed, e.to_string())
        })?;
        let records = index.len();
        let epoch = self.service.index_handle().replace(index);

        Ok(ReloadResponse {
            epoch,
            records,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Bind the socket, replacing a stale one.
    pub fn bind(&self) -> std::io::Result<UnixListener> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        if let Some(parent) = self.config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    /// Bind and serve until shutdown.
    pub fn run(self: &Arc<Self>) -> std::io::Result<()> {
        let listener = self.bind()?;
        self.serve(listener)
    }

    /// Serve connections on an already bound listener until shutdown.
    pub fn serve(self: &Arc<Self>, listener: UnixListener) -> std::io::Result<()> {
        if !self.service.index_handle().is_loaded() && self.config.records_path.is_some() {
            match self.reload() {
                Ok(r) => info!(epoch = r.epoch, records = r.records, "Initial watchlist loaded"),
                Err(e) => warn!(error = %e.message, "Starting without a watchlist index"),
            }
        }

        info!(
            socket = %self.config.socket_path.display(),
            max_connections = self.config.max_connections,
            max_concurrent = self.service.config().max_concurrent,
            memory = %self.resources.memory_usage_human(),
            "Daemon listening"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping daemon");
                break;
            }

            if self.should_shutdown_idle() {
                info!(
                    idle_secs = self.config.idle_timeout.as_secs(),
                    "Idle timeout reached, shutting down"
                );
                break;
            }

            match listener.accept() {
                Ok((stream, _addr)) => {
                    let active = self.active_connections.fetch_add(1, Ordering::SeqCst);
                    if active >= self.config.max_connections as u64 {
                        self.active_connections.fetch_sub(1, Ordering::SeqCst);
                        warn!(
                            active = active,
                            max = self.config.max_connections,
                            "Max connections reached, rejecting"
                        );
                        continue;
                    }

                    self.touch_activity();
                    let daemon = Arc::clone(self);
                    let spawned = std::thread::Builder::new()
                        .name("wscreen-conn".into())
                        .spawn(move || {
                            if let Err(e) = daemon.handle_connection(stream) {
                                debug!(error = %e, "Connection error");
                            }
                            daemon.active_connections.fetch_sub(1, Ordering::SeqCst);
                        });
                    if let Err(e) = spawned {
                        self.active_connections.fetch_sub(1, Ordering::SeqCst);
                        error!(error = %e, "Failed to spawn connection thread");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No pending connections, sleep briefly
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        if self.config.socket_path.exists() {
            let _ = std::fs::remove_file(&self.config.socket_path);
        }

        info!("Daemon stopped");
        Ok(())
    }

    /// Handle a single client connection.
    fn handle_connection(&self, mut stream: UnixStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.config.request_timeout))?;
        stream.set_write_timeout(Some(self.config.request_timeout))?;

        loop {
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Client disconnected");
                    return Ok(());
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    debug!("Connection timed out");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            let len = u32::from_be_bytes(len_buf) as usize;
            if len > MAX_FRAME_BYTES {
                warn!(len = len, "Request too large, closing connection");
                return Ok(());
            }

            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload)?;

            let response = match decode_message::<Request>(&payload) {
                Ok(msg) if msg.version != PROTOCOL_VERSION => FramedMessage::new(
                    msg.request_id,
                    Response::Error(ErrorResponse::new(
                        ErrorCode::VersionMismatch,
                        format!(
                            "protocol version mismatch: expected {}, got {}",
                            PROTOCOL_VERSION, msg.version
                        ),
                    )),
                ),
                Ok(msg) => {
                    self.total_requests.fetch_add(1, Ordering::Relaxed);
                    self.touch_activity();
                    let response = self.handle_request(&msg.request_id, msg.payload);
                    FramedMessage::new(msg.request_id, response)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to decode request");
                    FramedMessage::new(
                        "error",
                        Response::Error(ErrorResponse::new(
                            ErrorCode::InvalidInput,
                            e.to_string(),
                        )),
                    )
                }
            };

            let encoded =
                encode_message(&response).map_err(|e| std::io::Error::other(e.to_string()))?;
            stream.write_all(&encoded)?;

            if matches!(response.payload, Response::Shutdown { .. }) {
                return Ok(());
            }
        }
    }

    /// Handle a single request.
    pub fn handle_request(&self, request_id: &str, request: Request) -> Response {
        match request {
            Request::Health => Response::Health(HealthStatus {
                uptime_secs: self.uptime_secs(),
                version: PROTOCOL_VERSION,
                ready: self.service.index_handle().is_loaded(),
                memory_bytes: self.resources.memory_usage(),
            }),

            Request::Search { query, timeout_ms } => {
                debug!(request_id = %request_id, "Processing search request");
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .or_else(|| self.service.config().default_timeout());
                match self.service.search_with_timeout(&query, timeout) {
                    Ok(resp) => Response::Search(resp),
                    Err(e) => Response::Error(ErrorResponse::from(&e)),
                }
            }

            Request::Reload => {
                info!(request_id = %request_id, "Reload requested");
                match self.reload() {
                    Ok(resp) => Response::Reloaded(resp),
                    Err(err) => Response::Error(err),
                }
            }

            Request::Status => {
                let snapshot = self.service.index_handle().current();
                Response::Status(StatusResponse {
                    uptime_secs: self.uptime_secs(),
                    version: PROTOCOL_VERSION,
                    index_epoch: snapshot.as_ref().map_or(0, |i| i.epoch()),
                    index_records: snapshot.as_ref().map_or(0, |i| i.len()),
                    index_built_at_ms: snapshot.as_ref().map(|i| i.built_at_ms()),
                    service: self.service.stats(),
                    memory_bytes: self.resources.memory_usage(),
                    total_requests: self.total_requests.load(Ordering::Relaxed),
                    active_connections: self.active_connections.load(Ordering::Relaxed),
                })
            }

            Request::Shutdown => {
                info!(request_id = %request_id, "Shutdown requested");
                self.shutdown.store(true, Ordering::SeqCst);
                Response::Shutdown {
                    message: "daemon shutting down".to_string(),
                }
            }
        }
    }

    /// Request the daemon to shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
