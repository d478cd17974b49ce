//! SOCKS5 request parser
//!
//! Parses the client's connection request once method negotiation is done.
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```

use super::codec::decode_address;
use super::consts::*;
use super::types::{SocksCommand, TargetAddr};
use crate::error::Socks5Error;

const HEADER_LEN: usize = 4;

/// A validated CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Where the client wants to go
    pub target: TargetAddr,
}

impl ConnectRequest {
    /// Try to decode a request from the start of `buf`.
    ///
    /// Returns `Ok(None)` until the self-described length has arrived. The
    /// command is only checked once the whole message is present, so a
    /// rejected BIND or UDP ASSOCIATE leaves nothing unread on the socket.
    /// When the address type is unknown the length cannot be known, and a
    /// command other than CONNECT is reported ahead of the address type.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, Socks5Error> {
        if let Some(&version) = buf.first() {
            if version != SOCKS5_VERSION {
                return Err(Socks5Error::UnsupportedVersion(version));
            }
        }
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let cmd_byte = buf[1];
        let addr_type = buf[3];

        let (target, addr_len) = match decode_address(&buf[HEADER_LEN..], addr_type) {
            Ok(decoded) => decoded,
            Err(Socks5Error::TruncatedAddress) => return Ok(None),
            // A non-CONNECT command outranks an unknown address type
            Err(Socks5Error::InvalidAddressType(_)) if cmd_byte != SOCKS5_CMD_TCP_CONNECT => {
                return Err(Socks5Error::UnsupportedCommand(cmd_byte));
            }
            Err(e) => return Err(e),
        };

        match SocksCommand::from_byte(cmd_byte) {
            Some(SocksCommand::Connect) => {}
            Some(other) => {
                tracing::debug!("Rejecting {} request to {}", other, target);
                return Err(Socks5Error::UnsupportedCommand(cmd_byte));
            }
            None => return Err(Socks5Error::UnsupportedCommand(cmd_byte)),
        }

        Ok(Some((ConnectRequest { target }, HEADER_LEN + addr_len)))
    }

    /// Parse a buffer that must hold exactly one request and nothing else
    pub fn parse(buf: &[u8]) -> Result<Self, Socks5Error> {
        match Self::decode(buf)? {
            Some((request, used)) if used == buf.len() => Ok(request),
            Some((_, used)) => Err(Socks5Error::TrailingBytes(buf.len() - used)),
            None => Err(Socks5Error::TruncatedAddress),
        }
    }
}
