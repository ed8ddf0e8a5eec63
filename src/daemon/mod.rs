//! Screening daemon: a long-lived process holding the watchlist in memory.
//!
//! Batch integrations and operator tooling talk to it over a Unix Domain
//! Socket instead of reloading the watchlist for every lookup:
//! - Length-prefixed MessagePack frames (see [`protocol`])
//! - One thread per connection, scans bounded by the service's slot pool
//! - `Reload` swaps in a freshly parsed index without dropping queries
//!
//! ## Usage
//!
//! ```ignore
//! use watchlist_screen::daemon::{UdsDaemonClient, ScreenDaemon};
//!
//! // Server
//! let daemon = Arc::new(ScreenDaemon::new(DaemonConfig::from_env(), service));
//! daemon.run()?;
//!
//! // Client
//! let client = UdsDaemonClient::with_defaults();
//! let resp = client.search(RawQuery::new("John Smith"), None)?;
//! ```

pub mod client;
pub mod core;
pub mod protocol;
pub mod resource;

pub use client::{ClientError, DaemonClientConfig, UdsDaemonClient};
pub use core::ScreenDaemon;
pub use protocol::{PROTOCOL_VERSION, Request, Response, default_socket_path};
pub use resource::ResourceMonitor;
