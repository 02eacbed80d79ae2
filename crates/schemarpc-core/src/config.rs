//! Centralized configuration for schemarpc.
//!
//! Protocol limits and process defaults live here as constants; per-client
//! options are carried in [`ClientConfig`].

use std::time::Duration;

/// Protocol and runtime configuration.
pub struct RpcConfig;

impl RpcConfig {
    /// Port used by both processes when none is given.
    pub const DEFAULT_PORT: u16 = 50051;
    /// Server binds all interfaces by default.
    pub const DEFAULT_BIND_HOST: &'static str = "0.0.0.0";
    /// Client dials the local host by default.
    pub const DEFAULT_DIAL_HOST: &'static str = "localhost";

    pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024; // 4MB
    pub const MAX_CONNECTIONS: usize = 256;
    /// Pause after a failed `accept` before trying again.
    pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
}

/// Client stub options.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Deadline for a whole call, connect included. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Keep one idle connection open between sequential calls.
    pub reuse_connection: bool,
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_reuse_connection(mut self, reuse: bool) -> Self {
        self.reuse_connection = reuse;
        self
    }
}
