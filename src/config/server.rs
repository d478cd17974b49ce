//! Server configuration types
//!
//! Defines the main configuration structures for the proxy.

use super::TcpConfig;
use crate::error::ProxyError;
use crate::socks::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_name() -> String {
    "sockrelay".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8099".to_string()
}

fn default_max_sessions() -> usize {
    1024
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server name, reported in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Address to accept SOCKS5 clients on (e.g., "0.0.0.0:8099")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Seconds in-flight sessions may keep running after shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// SOCKS5 session configuration
    #[serde(default)]
    pub socks: SocksConfig,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            listen_addr: default_listen_addr(),
            max_sessions: default_max_sessions(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            socks: SocksConfig::default(),
            tcp: TcpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Grace period granted to sessions on shutdown
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.max_sessions == 0 {
            return Err(ProxyError::Config(
                "max_sessions must be greater than 0".to_string(),
            ));
        }
        self.socks.validate()
    }
}

fn default_handshake_timeout() -> u64 {
    10
}

/// Default connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

fn default_relay_idle_timeout() -> u64 {
    300
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// SOCKS5 session configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SocksConfig {
    /// Idle timeout in seconds for each handshake and request read
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Timeout in seconds for each outbound connect attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Relay idle timeout in seconds (0 = never)
    #[serde(default = "default_relay_idle_timeout")]
    pub relay_idle_timeout: u64,

    /// Per-direction relay buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: default_handshake_timeout(),
            connect_timeout: default_connect_timeout(),
            relay_idle_timeout: default_relay_idle_timeout(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl SocksConfig {
    /// Handshake/request read timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Per-candidate connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Relay idle timeout, `None` when disabled
    pub fn relay_idle_timeout(&self) -> Option<Duration> {
        (self.relay_idle_timeout > 0).then(|| Duration::from_secs(self.relay_idle_timeout))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.handshake_timeout == 0 {
            return Err(ProxyError::Config(
                "handshake_timeout must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout == 0 {
            return Err(ProxyError::Config(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ProxyError::Config(
                "buffer_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
