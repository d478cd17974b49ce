//! SOCKS5 listener
//!
//! Accepts client connections, assigns session identifiers and enforces
//! the concurrent session limit.

use crate::config::ServerConfig;
use crate::error::ProxyError;
use crate::socks::{Session, UpstreamConnector};
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// The SOCKS5 server
pub struct Server {
    /// Listener configuration
    config: ServerConfig,
    /// Bound listening socket
    listener: TcpListener,
    /// Shared by all sessions
    connector: Arc<UpstreamConnector>,
    /// Applied to accepted client sockets
    socket_opts: SocketOpts,
    /// One permit per running session
    limiter: Arc<Semaphore>,
    /// Source of session identifiers
    next_id: AtomicU64,
}

impl Server {
    /// Bind the listening socket
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

        let socket_opts = SocketOpts::from_tcp_config(&config.tcp);
        let connector = UpstreamConnector::new(config.socks.connect_timeout(), socket_opts.clone());
        let limiter = Arc::new(Semaphore::new(config.max_sessions));

        Ok(Server {
            config,
            listener,
            connector: Arc::new(connector),
            socket_opts,
            limiter,
            next_id: AtomicU64::new(1),
        })
    }

    /// Replace the upstream connector
    pub fn with_connector(mut self, connector: UpstreamConnector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept clients until shutdown, then drain sessions
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!(
            "Starting {} on {}",
            self.config.name,
            self.local_addr().context("Failed to read listener address")?
        );

        let mut sessions = JoinSet::new();
        let mut backoff = ACCEPT_BACKOFF_MIN;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            backoff = ACCEPT_BACKOFF_MIN;
                            self.admit(stream, peer, &mut sessions);
                        }
                        Err(e) => {
                            // Usually fd exhaustion; give running sessions a chance to finish
                            warn!("Accept failed: {}. Retrying in {:?}", e, backoff);
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                        }
                    }
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Session task panicked: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, no longer accepting clients");
                    break;
                }
            }
        }

        drop(self.listener);
        drain(sessions, self.config.shutdown_grace()).await;

        info!("Server stopped");
        Ok(())
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr, sessions: &mut JoinSet<()>) {
        let permit = match self.limiter.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let err = ProxyError::Resource(format!(
                    "session limit of {} reached",
                    self.config.max_sessions
                ));
                warn!("Refusing {}: {}", peer, err);
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Accepted {} as session {}", peer, id);

        self.socket_opts.hint(&stream);
        let session = Session::new(
            id,
            stream,
            self.config.socks.clone(),
            self.connector.clone(),
        );

        sessions.spawn(async move {
            let _ = session.run().await;
            drop(permit);
        });
    }
}

/// Let sessions finish within `grace`, then abort the rest
async fn drain(mut sessions: JoinSet<()>, grace: Duration) {
    if sessions.is_empty() {
        return;
    }

    info!(
        "Waiting up to {:?} for {} session(s) to finish",
        grace,
        sessions.len()
    );
    let finished = tokio::time::timeout(grace, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!("Aborting {} session(s) after grace period", sessions.len());
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
    }
}
