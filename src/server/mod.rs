//! Server module for Sockrelay
//!
//! This module contains the TCP listener that accepts SOCKS5 clients and
//! runs one session per connection.

mod listener;

pub use listener::Server;

use crate::config::Config;
use anyhow::Result;
use tokio::sync::broadcast;

/// Run the proxy with the given configuration until shutdown
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let server = Server::bind(config.server).await?;
    server.run(shutdown_rx).await
}
