//! Error types for Sockrelay
//!
//! This module defines all custom error types used throughout the proxy,
//! from wire-protocol violations up to the session and server level.

use crate::socks::Direction;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Server-level errors
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource exhaustion (session limit, file descriptors)
    #[error("Resource error: {0}")]
    Resource(String),
}

/// SOCKS5 wire-protocol errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Command other than CONNECT
    #[error("Command not supported: {0}")]
    UnsupportedCommand(u8),

    /// Unknown ATYP value
    #[error("Address type not supported: {0}")]
    InvalidAddressType(u8),

    /// Fewer bytes than the address encoding requires
    #[error("Truncated address")]
    TruncatedAddress,

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Peer closed the stream before a complete message arrived
    #[error("Unexpected end of stream during {0}")]
    UnexpectedEof(&'static str),

    /// Bytes following a complete message
    #[error("Overlong message: {0} trailing bytes")]
    TrailingBytes(usize),

    /// Buffered the largest possible message without completing one
    #[error("Message longer than {0} bytes")]
    MessageTooLong(usize),

    /// Client stayed silent for longer than the handshake timeout
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

impl Socks5Error {
    /// Reply code owed to the client when this error is detected while
    /// reading the request
    pub fn reply_code(&self) -> Socks5ReplyCode {
        match self {
            Socks5Error::UnsupportedCommand(_) => Socks5ReplyCode::CommandNotSupported,
            Socks5Error::InvalidAddressType(_) => Socks5ReplyCode::AddressTypeNotSupported,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

/// Failure to reach the requested target
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Name resolution failed
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        /// Host that failed to resolve
        host: String,
        /// Underlying resolver error
        #[source]
        source: io::Error,
    },

    /// Name resolved to an empty address list
    #[error("No addresses found for {0}")]
    NoAddresses(String),

    /// Every candidate failed; carries the last attempt's error
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Last candidate attempted
        addr: SocketAddr,
        /// Error returned by that attempt
        #[source]
        source: io::Error,
    },

    /// Last candidate did not answer within the connect timeout
    #[error("Connection timeout to {0}")]
    Timeout(SocketAddr),
}

impl ConnectError {
    /// Reply code reported to the client for this failure
    pub fn reply_code(&self) -> Socks5ReplyCode {
        match self {
            ConnectError::Resolve { .. } | ConnectError::NoAddresses(_) => {
                Socks5ReplyCode::HostUnreachable
            }
            ConnectError::Connect { source, .. } => Socks5ReplyCode::from(source),
            ConnectError::Timeout(_) => Socks5ReplyCode::HostUnreachable,
        }
    }
}

/// Relay phase errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Reading from the source of a pipeline failed
    #[error("{direction} read failed: {source}")]
    Read {
        /// Pipeline that failed
        direction: Direction,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Writing to the destination of a pipeline failed
    #[error("{direction} write failed: {source}")]
    Write {
        /// Pipeline that failed
        direction: Direction,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Neither direction moved data within the idle timeout
    #[error("Relay idle for {0:?}")]
    IdleTimeout(Duration),
}

/// Everything that can end a session early
#[derive(Error, Debug)]
pub enum SessionError {
    /// Malformed or unsupported client message
    #[error(transparent)]
    Protocol(#[from] Socks5Error),

    /// Target could not be reached
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Socket error outside the relay (handshake writes, reply send)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Relay phase failure
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl SessionError {
    /// Reply code owed to the client for this failure, if any.
    ///
    /// Socket failures and relay errors happen when the client can no
    /// longer be told anything useful, so no reply is sent for them.
    pub fn reply_code(&self) -> Option<Socks5ReplyCode> {
        match self {
            SessionError::Protocol(Socks5Error::NoAcceptableMethod) => None,
            SessionError::Protocol(e) => Some(e.reply_code()),
            SessionError::Connect(e) => Some(e.reply_code()),
            SessionError::Io(_) | SessionError::Relay(_) => None,
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

/// Classify an outbound connect failure
impl From<&io::Error> for Socks5ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Socks5ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => Socks5ReplyCode::NetworkUnreachable,
            io::ErrorKind::PermissionDenied => Socks5ReplyCode::ConnectionNotAllowed,
            _ => Socks5ReplyCode::HostUnreachable,
        }
    }
}
