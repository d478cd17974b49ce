//! Upstream connector
//!
//! Resolves the requested target and opens the outbound TCP connection,
//! trying candidates in resolver order.

use super::types::TargetAddr;
use crate::error::ConnectError;
use crate::transport::{Resolver, SocketOpts, SystemResolver};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// An established upstream connection
#[derive(Debug)]
pub struct Upstream {
    /// The outbound socket
    pub stream: TcpStream,
    /// Target endpoint that accepted the connection
    pub peer_addr: SocketAddr,
    /// Our side of the connection, reported as BND.ADDR/BND.PORT
    pub local_addr: SocketAddr,
}

/// Opens outbound connections on behalf of sessions
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    resolver: Arc<dyn Resolver>,
    connect_timeout: Duration,
    socket_opts: SocketOpts,
}

impl UpstreamConnector {
    /// Create a connector using the system resolver
    pub fn new(connect_timeout: Duration, socket_opts: SocketOpts) -> Self {
        UpstreamConnector {
            resolver: Arc::new(SystemResolver),
            connect_timeout,
            socket_opts,
        }
    }

    /// Replace the resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Turn a target into the ordered list of addresses to try.
    ///
    /// Literal addresses are returned as the single candidate without
    /// consulting the resolver.
    pub async fn resolve(&self, target: &TargetAddr) -> Result<Vec<SocketAddr>, ConnectError> {
        match target {
            TargetAddr::Ip(addr) => Ok(vec![*addr]),
            TargetAddr::Domain(host, port) => {
                let candidates = self.resolver.resolve(host, *port).await.map_err(|source| {
                    ConnectError::Resolve {
                        host: host.clone(),
                        source,
                    }
                })?;

                if candidates.is_empty() {
                    return Err(ConnectError::NoAddresses(host.clone()));
                }

                debug!("Resolved {} to {:?}", host, candidates);
                Ok(candidates)
            }
        }
    }

    /// Connect to the first candidate that accepts.
    ///
    /// Candidates are tried one after another; when all fail the error of
    /// the last attempt is returned.
    pub async fn connect(&self, candidates: &[SocketAddr]) -> Result<Upstream, ConnectError> {
        let mut last_error = None;

        for &addr in candidates {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let local_addr = stream.local_addr().map_err(|source| {
                        ConnectError::Connect { addr, source }
                    })?;
                    self.socket_opts.hint(&stream);
                    return Ok(Upstream {
                        stream,
                        peer_addr: addr,
                        local_addr,
                    });
                }
                Ok(Err(source)) => {
                    debug!("Connect to {} failed: {}", addr, source);
                    last_error = Some(ConnectError::Connect { addr, source });
                }
                Err(_) => {
                    debug!("Connect to {} timed out", addr);
                    last_error = Some(ConnectError::Timeout(addr));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectError::NoAddresses(String::new())))
    }
}

impl Default for UpstreamConnector {
    fn default() -> Self {
        UpstreamConnector::new(Duration::from_secs(10), SocketOpts::default())
    }
}
