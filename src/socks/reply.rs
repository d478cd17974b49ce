//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```

use super::codec::encode_bound_address;
use super::consts::*;
use crate::error::Socks5ReplyCode;
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Outcome of a request, ready to be written to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    code: Socks5ReplyCode,
    bound: Option<SocketAddr>,
}

impl Reply {
    /// Success, reporting the outbound socket's local endpoint
    pub fn success(bound: SocketAddr) -> Self {
        Reply {
            code: Socks5ReplyCode::Succeeded,
            bound: Some(bound),
        }
    }

    /// Failure; the bound address is zeroed
    pub fn failure(code: Socks5ReplyCode) -> Self {
        Reply { code, bound: None }
    }

    /// Reply status code
    pub fn code(&self) -> Socks5ReplyCode {
        self.code
    }

    /// Serialize the reply
    pub fn encode(&self) -> BytesMut {
        let mut reply = BytesMut::with_capacity(3 + 1 + 16 + 2);
        reply.put_u8(SOCKS5_VERSION);
        reply.put_u8(self.code.into());
        reply.put_u8(SOCKS5_RESERVED);

        let bound = self
            .bound
            .filter(|_| self.code == Socks5ReplyCode::Succeeded)
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        encode_bound_address(bound, &mut reply);

        reply
    }

    /// Write the reply to the client
    pub async fn send<S>(&self, stream: &mut S) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&self.encode()).await?;
        stream.flush().await
    }
}
