//! Test utilities and mocks for Sockrelay
//!
//! This module provides common test utilities used across integration tests.

use sockrelay::config::{ServerConfig, SocksConfig};
use sockrelay::socks::UpstreamConnector;
use sockrelay::Server;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A loopback address nothing listens on
pub async fn closed_port() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Spawn a TCP echo server that serves any number of connections
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Test configuration builder
pub struct TestConfigBuilder {
    max_sessions: usize,
    handshake_timeout: u64,
    relay_idle_timeout: u64,
    buffer_size: usize,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            max_sessions: 16,
            handshake_timeout: 5,
            relay_idle_timeout: 0,
            buffer_size: 1024,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session limit
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the handshake timeout in seconds
    pub fn handshake_timeout(mut self, secs: u64) -> Self {
        self.handshake_timeout = secs;
        self
    }

    /// Set the relay idle timeout in seconds
    pub fn relay_idle_timeout(mut self, secs: u64) -> Self {
        self.relay_idle_timeout = secs;
        self
    }

    /// Set the relay buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Build the configuration, listening on an ephemeral loopback port
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            max_sessions: self.max_sessions,
            shutdown_grace_secs: 1,
            socks: SocksConfig {
                handshake_timeout: self.handshake_timeout,
                connect_timeout: 2,
                relay_idle_timeout: self.relay_idle_timeout,
                buffer_size: self.buffer_size,
            },
            ..Default::default()
        }
    }
}

/// A running proxy under test
pub struct TestProxy {
    /// Where clients connect
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestProxy {
    /// Start a proxy with the given configuration
    pub async fn start(config: ServerConfig) -> Self {
        Self::start_with(config, None).await
    }

    /// Start a proxy with a custom upstream connector
    pub async fn start_with(config: ServerConfig, connector: Option<UpstreamConnector>) -> Self {
        let mut server = Server::bind(config).await.unwrap();
        if let Some(connector) = connector {
            server = server.with_connector(connector);
        }
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(shutdown_rx));
        TestProxy {
            addr,
            shutdown_tx,
            handle,
        }
    }

    /// Open a client connection to the proxy
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Signal shutdown and wait for the server to stop
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        tokio::time::timeout(std::time::Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Read a complete CONNECT reply
pub async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut reply = vec![0u8; 4];
    stream.read_exact(&mut reply).await.unwrap();
    let rest = match reply[3] {
        0x04 => 16 + 2,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.unwrap();
            reply.push(len[0]);
            len[0] as usize + 2
        }
        _ => 4 + 2,
    };
    let start = reply.len();
    reply.resize(start + rest, 0);
    stream.read_exact(&mut reply[start..]).await.unwrap();
    reply
}

/// Negotiate "no authentication", asserting the server accepts it
pub async fn negotiate_no_auth(stream: &mut TcpStream) {
    stream
        .write_all(&socks5_mock::create_auth_request_no_auth())
        .await
        .unwrap();
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x00]);
}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use sockrelay::socks::*;
    use std::net::SocketAddr;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create a request with an arbitrary command
    pub fn create_request(cmd: u8, target: &TargetAddr) -> Vec<u8> {
        let mut request = vec![SOCKS5_VERSION, cmd, SOCKS5_RESERVED];
        encode_address(target, &mut request);
        request
    }

    /// Create a connect command to a socket address
    pub fn create_connect(addr: SocketAddr) -> Vec<u8> {
        create_request(SOCKS5_CMD_TCP_CONNECT, &TargetAddr::Ip(addr))
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[test]
    fn test_config_builder() {
        let config = TestConfigBuilder::new()
            .max_sessions(2)
            .handshake_timeout(3)
            .relay_idle_timeout(7)
            .buffer_size(512)
            .build();

        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.socks.handshake_timeout, 3);
        assert_eq!(config.socks.relay_idle_timeout, 7);
        assert_eq!(config.socks.buffer_size, 512);
        assert!(config.validate().is_ok());
    }
}
