//! SOCKS5 session
//!
//! One session per accepted client. The phases run as sequential awaits
//! inside a single future that owns both sockets, so nothing can outlive
//! the session or touch its buffers from elsewhere.

use super::connector::UpstreamConnector;
use super::consts::*;
use super::handshake::{send_method_reply, AuthMethod, MethodSelection};
use super::relay::{relay, RelayConfig, RelayStats};
use super::reply::Reply;
use super::request::ConnectRequest;
use super::types::TargetAddr;
use crate::config::SocksConfig;
use crate::error::{SessionError, Socks5Error};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Session lifecycle. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Waiting for the method selection message
    Handshaking,
    /// Answering the method selection
    NegotiatingMethod,
    /// Waiting for the CONNECT request
    AwaitingRequest,
    /// Resolving the target name
    Resolving,
    /// Connecting to the target
    Connecting,
    /// Writing the success reply
    SendingReply,
    /// Forwarding bytes both ways
    Relaying,
    /// Terminal; both sockets released
    Closed,
}

impl Phase {
    fn advance(&mut self, next: Phase) {
        if next <= *self {
            debug!("Ignoring phase change {} -> {}", self, next);
            return;
        }
        trace!("{} -> {}", self, next);
        *self = next;
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Handshaking => "handshaking",
            Phase::NegotiatingMethod => "negotiating-method",
            Phase::AwaitingRequest => "awaiting-request",
            Phase::Resolving => "resolving",
            Phase::Connecting => "connecting",
            Phase::SendingReply => "sending-reply",
            Phase::Relaying => "relaying",
            Phase::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// A single client connection moving through the SOCKS5 phases
#[derive(Debug)]
pub struct Session<S> {
    id: u64,
    phase: Phase,
    client: Option<S>,
    upstream: Option<TcpStream>,
    target: Option<TargetAddr>,
    config: SocksConfig,
    connector: Arc<UpstreamConnector>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session for an accepted client connection
    pub fn new(
        id: u64,
        client: S,
        config: SocksConfig,
        connector: Arc<UpstreamConnector>,
    ) -> Self {
        Session {
            id,
            phase: Phase::Handshaking,
            client: Some(client),
            upstream: None,
            target: None,
            config,
            connector,
        }
    }

    /// Session identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Requested target, once the request was parsed
    pub fn target(&self) -> Option<&TargetAddr> {
        self.target.as_ref()
    }

    /// Drive the session to completion, then release both sockets.
    ///
    /// Errors never leave the session other than through the return value;
    /// the outcome is logged here.
    pub async fn run(mut self) -> Result<RelayStats, SessionError> {
        let span = info_span!("session", id = self.id);

        async move {
            let result = self.drive().await;
            self.close().await;
            self.log_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    /// Close whatever is still open. Calling it again does nothing.
    pub async fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase.advance(Phase::Closed);

        if let Some(mut upstream) = self.upstream.take() {
            if let Err(e) = upstream.shutdown().await {
                trace!("Upstream shutdown: {}", e);
            }
        }
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.shutdown().await {
                trace!("Client shutdown: {}", e);
            }
        }
    }

    async fn drive(&mut self) -> Result<RelayStats, SessionError> {
        let read_timeout = self.config.handshake_timeout();
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        // Method selection
        let mut handshake_buf = BytesMut::with_capacity(MAX_HANDSHAKE_LEN);
        let (selection, used) = read_message(
            client,
            &mut handshake_buf,
            MAX_HANDSHAKE_LEN,
            read_timeout,
            "method selection",
            MethodSelection::decode,
        )
        .await?;
        // A client may send its request without waiting for our answer
        let early_request = handshake_buf.split_off(used);

        self.phase.advance(Phase::NegotiatingMethod);
        let method = selection.negotiate();
        send_method_reply(client, method).await?;
        if method == AuthMethod::NotAcceptable {
            return Err(Socks5Error::NoAcceptableMethod.into());
        }

        // Request
        self.phase.advance(Phase::AwaitingRequest);
        let mut request_buf = BytesMut::with_capacity(MAX_REQUEST_LEN);
        request_buf.extend_from_slice(&early_request);
        let request = match read_request(client, &mut request_buf, read_timeout).await {
            Ok(request) => request,
            Err(e) => {
                send_failure(client, &e).await;
                return Err(e);
            }
        };

        let target = self.target.insert(request.target);
        info!("CONNECT {}", target);

        // Upstream
        self.phase.advance(Phase::Resolving);
        let candidates = match self.connector.resolve(target).await {
            Ok(candidates) => candidates,
            Err(e) => {
                let e = SessionError::from(e);
                send_failure(client, &e).await;
                return Err(e);
            }
        };

        self.phase.advance(Phase::Connecting);
        let upstream = match self.connector.connect(&candidates).await {
            Ok(upstream) => upstream,
            Err(e) => {
                let e = SessionError::from(e);
                send_failure(client, &e).await;
                return Err(e);
            }
        };
        debug!(
            "Connected to {} from {}",
            upstream.peer_addr, upstream.local_addr
        );

        self.phase.advance(Phase::SendingReply);
        let upstream_stream = self.upstream.insert(upstream.stream);
        Reply::success(upstream.local_addr).send(client).await?;

        self.phase.advance(Phase::Relaying);
        let relay_config = RelayConfig {
            buffer_size: self.config.buffer_size,
            idle_timeout: self.config.relay_idle_timeout(),
        };
        let stats = relay(client, upstream_stream, relay_config).await?;
        Ok(stats)
    }

    fn log_outcome(&self, result: &Result<RelayStats, SessionError>) {
        let target = self
            .target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());

        match result {
            Ok(stats) => info!(
                "Session to {} closed: {} bytes up, {} bytes down",
                target, stats.client_to_upstream, stats.upstream_to_client
            ),
            Err(SessionError::Protocol(
                e @ (Socks5Error::NoAcceptableMethod | Socks5Error::UnexpectedEof(_)),
            )) => debug!("Session closed: {}", e),
            Err(SessionError::Protocol(e)) => warn!("Protocol error: {}", e),
            Err(SessionError::Connect(e)) => warn!("Upstream {} failed: {}", target, e),
            Err(SessionError::Io(e)) => debug!("Session I/O error: {}", e),
            Err(SessionError::Relay(e)) => debug!("Relay to {} ended: {}", target, e),
        }
    }
}

/// Read until `decode` yields a complete message.
///
/// At most `max_len` bytes are buffered, and every read is bounded by
/// `read_timeout`.
async fn read_message<S, T, F>(
    client: &mut S,
    buf: &mut BytesMut,
    max_len: usize,
    read_timeout: Duration,
    what: &'static str,
    decode: F,
) -> Result<(T, usize), SessionError>
where
    S: AsyncRead + Unpin,
    F: Fn(&[u8]) -> Result<Option<(T, usize)>, Socks5Error>,
{
    loop {
        if let Some(message) = decode(&buf[..])? {
            return Ok(message);
        }

        let room = max_len.saturating_sub(buf.len());
        if room == 0 {
            return Err(Socks5Error::MessageTooLong(max_len).into());
        }

        let mut window = (&mut *buf).limit(room);
        let n = tokio::time::timeout(read_timeout, client.read_buf(&mut window))
            .await
            .map_err(|_| Socks5Error::Timeout(what))??;
        if n == 0 {
            return Err(Socks5Error::UnexpectedEof(what).into());
        }
    }
}

async fn read_request<S>(
    client: &mut S,
    buf: &mut BytesMut,
    read_timeout: Duration,
) -> Result<ConnectRequest, SessionError>
where
    S: AsyncRead + Unpin,
{
    read_message(
        client,
        buf,
        MAX_REQUEST_LEN,
        read_timeout,
        "request",
        ConnectRequest::decode,
    )
    .await?;

    // Bytes past the request in the same read make it overlong
    Ok(ConnectRequest::parse(&buf[..])?)
}

/// Best effort; the session is ending either way
async fn send_failure<S>(client: &mut S, err: &SessionError)
where
    S: AsyncWrite + Unpin,
{
    if let Some(code) = err.reply_code() {
        if let Err(e) = Reply::failure(code).send(client).await {
            debug!("Failed to send {:?} reply: {}", code, e);
        }
    }
}
