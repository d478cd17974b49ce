//! Transport module for Sockrelay
//!
//! Socket tuning and name resolution shared by the listener and the
//! upstream connector.

mod resolver;

pub use resolver::{Resolver, StaticResolver, SystemResolver};

use crate::config::TcpConfig;
use std::time::Duration;
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts::from_tcp_config(&TcpConfig::default())
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        let keepalive = config.keepalive_secs > 0;
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: keepalive.then_some(config.keepalive_secs),
            keepalive_interval: keepalive.then_some(config.keepalive_interval.max(1)),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }

    /// Apply options, logging instead of failing
    pub fn hint(&self, stream: &TcpStream) {
        if let Err(e) = self.apply(stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }
    }
}
