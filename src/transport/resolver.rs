//! Hostname resolution
//!
//! Domain targets are resolved through the [`Resolver`] trait so the
//! connector can be driven by a fixed table in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::net::SocketAddr;

/// Resolves a hostname to an ordered list of candidate socket addresses
#[async_trait]
pub trait Resolver: Debug + Send + Sync {
    /// Resolve `host`, returning candidates with `port` filled in
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the system resolver (getaddrinfo on a blocking pool)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.collect())
    }
}

/// Resolver answering from a fixed table
///
/// Hosts missing from the table fail with `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<SocketAddr>>,
}

impl StaticResolver {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host; the port of each candidate is replaced by the requested one
    pub fn with_host(mut self, host: &str, addrs: Vec<SocketAddr>) -> Self {
        self.entries.insert(host.to_ascii_lowercase(), addrs);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        match self.entries.get(&host.to_ascii_lowercase()) {
            Some(addrs) => Ok(addrs
                .iter()
                .map(|addr| SocketAddr::new(addr.ip(), port))
                .collect()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no entry for {}", host),
            )),
        }
    }
}
