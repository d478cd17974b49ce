//! # Sockrelay - SOCKS5 Proxy Server
//!
//! Sockrelay is a small SOCKS5 (RFC 1928) proxy. It accepts clients on a
//! TCP listener, negotiates the "no authentication" method, serves CONNECT
//! requests to IPv4, IPv6 and domain-name targets, and relays bytes in both
//! directions until either side is done.
//!
//! ## Features
//!
//! - **CONNECT only**: BIND and UDP ASSOCIATE are answered with "command not supported"
//! - **Bounded relay**: one fixed buffer per direction, backpressure by construction
//! - **Half-close aware**: end-of-stream on one side is forwarded while the other keeps flowing
//! - **Timeouts**: handshake, per-candidate connect and relay idle timeouts
//! - **Graceful shutdown**: in-flight sessions get a grace period before being aborted
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockrelay::config::load_config;
//! use sockrelay::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! Every accepted connection becomes a [`socks::Session`] running in its own
//! task. The session walks through method negotiation, request parsing,
//! upstream connection and the success reply before handing both sockets to
//! the relay.
//!
//! ```text
//! SOCKS5 Client -> Sockrelay -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{ProxyError, SessionError, Socks5Error};
pub use server::{run_server, Server};

/// Version of the Sockrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "sockrelay");
    }
}
