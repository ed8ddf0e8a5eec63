//! Environment-driven configuration.
//!
//! Every knob has a default and an optional `WSCREEN_*` override read through
//! `dotenvy`, so a `.env` file next to the binary works too. Values that fail
//! to parse are ignored and the default stays in place.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Limits and defaults for the search service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Ceiling on simultaneously executing ranking scans.
    pub max_concurrent: usize,
    /// How long a query may wait for a free slot before it is rejected.
    pub slot_wait: Duration,
    /// Limit used when the caller supplies none.
    pub default_limit: usize,
    /// Requested limits above this are clamped down.
    pub max_limit: usize,
    /// minMatch used when the caller supplies none.
    pub default_min_match: f64,
    /// Deadline applied when the caller supplies none (zero = no deadline).
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            slot_wait: Duration::from_secs(5),
            default_limit: 10,
            max_limit: 100,
            default_min_match: 0.70,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Load config from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = env_parse::<usize>("WSCREEN_MAX_CONCURRENT")
            && n > 0
        {
            cfg.max_concurrent = n;
        }

        if let Some(ms) = env_parse::<u64>("WSCREEN_SLOT_WAIT_MS") {
            cfg.slot_wait = Duration::from_millis(ms);
        }

        if let Some(n) = env_parse::<usize>("WSCREEN_DEFAULT_LIMIT")
            && n > 0
        {
            cfg.default_limit = n;
        }

        if let Some(n) = env_parse::<usize>("WSCREEN_MAX_LIMIT")
            && n > 0
        {
            cfg.max_limit = n;
        }

        if let Some(v) = env_parse::<f64>("WSCREEN_DEFAULT_MIN_MATCH")
            && (0.0..=1.0).contains(&v)
        {
            cfg.default_min_match = v;
        }

        if let Some(ms) = env_parse::<u64>("WSCREEN_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout = Duration::from_millis(ms);
        }

        cfg
    }

    /// `request_timeout`, or `None` when configured as zero.
    pub fn default_timeout(&self) -> Option<Duration> {
        (!self.request_timeout.is_zero()).then_some(self.request_timeout)
    }
}

/// Configuration for the screening daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,
    /// Watchlist file loaded at startup and on every reload.
    pub records_path: Option<PathBuf>,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Socket read/write timeout per request.
    pub request_timeout: Duration,
    /// Idle shutdown timeout (0 = never shutdown).
    pub idle_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: crate::daemon::protocol::default_socket_path(),
            records_path: None,
            max_connections: 64,
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(0), // Never shutdown by default
        }
    }
}

impl DaemonConfig {
    /// Load config from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = dotenvy::var("WSCREEN_SOCKET") {
            cfg.socket_path = PathBuf::from(path);
        }

        if let Ok(path) = dotenvy::var("WSCREEN_RECORDS") {
            cfg.records_path = Some(PathBuf::from(path));
        }

        if let Some(n) = env_parse::<usize>("WSCREEN_MAX_CONNECTIONS")
            && n > 0
        {
            cfg.max_connections = n;
        }

        if let Some(ms) = env_parse::<u64>("WSCREEN_REQUEST_TIMEOUT_MS") {
            cfg.request_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = env_parse::<u64>("WSCREEN_IDLE_TIMEOUT_SECS") {
            cfg.idle_timeout = Duration::from_secs(secs);
        }

        cfg
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    dotenvy::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard(&'static str);

    impl EnvGuard {
        fn set(key: &'static str, val: &str) -> Self {
            unsafe { std::env::set_var(key, val) };
            Self(key)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            unsafe { std::env::remove_var(self.0) };
        }
    }

    #[test]
    fn service_defaults() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.default_limit, 10);
        assert_eq!(cfg.max_limit, 100);
        assert!((cfg.default_min_match - 0.70).abs() < f64::EPSILON);
        assert!(cfg.max_concurrent >= 1);
        assert_eq!(cfg.default_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_means_none() {
        let cfg = ServiceConfig {
            request_timeout: Duration::ZERO,
            ..ServiceConfig::default()
        };
        assert_eq!(cfg.default_timeout(), None);
    }

    #[test]
    #[serial]
    fn service_reads_env_overrides() {
        let _a = EnvGuard::set("WSCREEN_MAX_CONCURRENT", "3");
        let _b = EnvGuard::set("WSCREEN_DEFAULT_MIN_MATCH", "0.9");
        let _c = EnvGuard::set("WSCREEN_SLOT_WAIT_MS", "250");
        let cfg = ServiceConfig::from_env();
        assert_eq!(cfg.max_concurrent, 3);
        assert!((cfg.default_min_match - 0.9).abs() < f64::EPSILON);
        assert_eq!(cfg.slot_wait, Duration::from_millis(250));
    }

    #[test]
    #[serial]
    fn invalid_env_values_keep_defaults() {
        let _a = EnvGuard::set("WSCREEN_MAX_CONCURRENT", "0");
        let _b = EnvGuard::set("WSCREEN_DEFAULT_MIN_MATCH", "1.5");
        let _c = EnvGuard::set("WSCREEN_DEFAULT_LIMIT", "ten");
        let cfg = ServiceConfig::from_env();
        let defaults = ServiceConfig::default();
        assert_eq!(cfg.max_concurrent, defaults.max_concurrent);
        assert_eq!(cfg.default_min_match, defaults.default_min_match);
        assert_eq!(cfg.default_limit, 10);
    }

    #[test]
    #[serial]
    fn daemon_reads_env_overrides() {
        let _a = EnvGuard::set("WSCREEN_SOCKET", "/tmp/wscreen-test.sock");
        let _b = EnvGuard::set("WSCREEN_RECORDS", "/data/sdn.jsonl");
        let _c = EnvGuard::set("WSCREEN_MAX_CONNECTIONS", "8");
        let cfg = DaemonConfig::from_env();
        assert_eq!(cfg.socket_path, PathBuf::from("/tmp/wscreen-test.sock"));
        assert_eq!(cfg.records_path, Some(PathBuf::from("/data/sdn.jsonl")));
        assert_eq!(cfg.max_connections, 8);
    }
}
