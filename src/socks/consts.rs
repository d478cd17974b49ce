//! SOCKS5 protocol constants
//!
//! Defines all constants used in the SOCKS5 protocol implementation.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// GSSAPI authentication (not implemented)
pub const SOCKS5_AUTH_METHOD_GSSAPI: u8 = 0x01;
/// Username/password authentication (not implemented)
pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (recognized, rejected)
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command (recognized, rejected)
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

// Message sizes
/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;
/// VER + NMETHODS + 255 methods
pub const MAX_HANDSHAKE_LEN: usize = 2 + 255;
/// VER CMD RSV ATYP + length byte + longest domain + port
pub const MAX_REQUEST_LEN: usize = 4 + 1 + MAX_DOMAIN_LEN + 2;
/// Default per-direction relay buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
