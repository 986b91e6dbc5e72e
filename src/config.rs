//! Configuration for brick daemon connections.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Brick daemon endpoint (`host:port`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout applied to every response-expected request.
    #[serde(default = "default_response_timeout", with = "humantime_serde")]
    pub response_timeout: Duration,

    /// Enable TCP_NODELAY on the socket.
    #[serde(default = "default_nodelay")]
    pub tcp_nodelay: bool,

    /// Depth of the outbound submission queue.
    #[serde(default = "default_submit_queue_depth")]
    pub submit_queue_depth: usize,

    /// Depth of the coordinator command queue.
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_endpoint() -> String {
    crate::DEFAULT_ENDPOINT.to_string()
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_response_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_nodelay() -> bool {
    true
}
fn default_submit_queue_depth() -> usize {
    8
}
fn default_command_queue_depth() -> usize {
    32
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout: default_connect_timeout(),
            response_timeout: default_response_timeout(),
            tcp_nodelay: default_nodelay(),
            submit_queue_depth: default_submit_queue_depth(),
            command_queue_depth: default_command_queue_depth(),
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for the given endpoint, defaults elsewhere.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::Config("endpoint must not be empty".into()));
        }
        if self.response_timeout.is_zero() {
            return Err(Error::Config("response timeout must be non-zero".into()));
        }
        if self.submit_queue_depth == 0 || self.command_queue_depth == 0 {
            return Err(Error::Config("queue depths must be non-zero".into()));
        }
        Ok(())
    }

    /// Set the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}
