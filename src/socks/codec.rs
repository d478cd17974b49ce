//! SOCKS5 address codec
//!
//! Pure conversions between the wire form of `ATYP | ADDR | PORT` and
//! [`TargetAddr`]. Nothing in here touches a socket.
//!
//! ```text
//! ATYP 0x01:  | 4 bytes IPv4 |                 | PORT(2) |
//! ATYP 0x03:  | LEN(1) | LEN bytes hostname    | PORT(2) |
//! ATYP 0x04:  | 16 bytes IPv6 |                | PORT(2) |
//! ```

use super::consts::*;
use super::types::TargetAddr;
use crate::error::Socks5Error;
use bytes::BufMut;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Decode `ADDR | PORT` for the given address type.
///
/// `buf` starts at the first address byte. On success returns the address
/// and the number of bytes it occupied; bytes past that are left alone so
/// the caller can decide whether trailing data is acceptable.
pub fn decode_address(buf: &[u8], addr_type: u8) -> Result<(TargetAddr, usize), Socks5Error> {
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let (octets, port) = split_fixed::<4>(buf)?;
            Ok((TargetAddr::ipv4(Ipv4Addr::from(octets), port), 4 + 2))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let (octets, port) = split_fixed::<16>(buf)?;
            Ok((TargetAddr::ipv6(Ipv6Addr::from(octets), port), 16 + 2))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = *buf.first().ok_or(Socks5Error::TruncatedAddress)? as usize;
            let total = 1 + domain_len + 2;
            if buf.len() < total {
                return Err(Socks5Error::TruncatedAddress);
            }
            if domain_len == 0 {
                return Err(Socks5Error::InvalidDomain("empty hostname".to_string()));
            }

            let name = &buf[1..1 + domain_len];
            let domain = std::str::from_utf8(name)
                .map_err(|_| Socks5Error::InvalidDomain(String::from_utf8_lossy(name).into_owned()))?;
            let port = u16::from_be_bytes([buf[1 + domain_len], buf[2 + domain_len]]);

            Ok((TargetAddr::domain(domain, port), total))
        }

        other => Err(Socks5Error::InvalidAddressType(other)),
    }
}

fn split_fixed<const N: usize>(buf: &[u8]) -> Result<([u8; N], u16), Socks5Error> {
    if buf.len() < N + 2 {
        return Err(Socks5Error::TruncatedAddress);
    }
    let mut octets = [0u8; N];
    octets.copy_from_slice(&buf[..N]);
    let port = u16::from_be_bytes([buf[N], buf[N + 1]]);
    Ok((octets, port))
}

/// Append `ATYP | ADDR | PORT` for `addr` to `buf`.
///
/// Domain names longer than 255 bytes cannot be represented and are
/// truncated to the first 255 bytes.
pub fn encode_address<B: BufMut>(addr: &TargetAddr, buf: &mut B) {
    match addr {
        TargetAddr::Ip(SocketAddr::V4(v4)) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
            buf.put_slice(&v4.ip().octets());
            buf.put_u16(v4.port());
        }
        TargetAddr::Ip(SocketAddr::V6(v6)) => {
            buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
            buf.put_slice(&v6.ip().octets());
            buf.put_u16(v6.port());
        }
        TargetAddr::Domain(domain, port) => {
            let name = &domain.as_bytes()[..domain.len().min(MAX_DOMAIN_LEN)];
            buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
            buf.put_u8(name.len() as u8);
            buf.put_slice(name);
            buf.put_u16(*port);
        }
    }
}

/// Append the bound address of a reply.
///
/// IPv4-mapped IPv6 endpoints (what a dual-stack socket reports for IPv4
/// peers) are written in the shorter IPv4 form.
pub fn encode_bound_address<B: BufMut>(bound: SocketAddr, buf: &mut B) {
    let canonical = match bound.ip() {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), bound.port()),
            None => bound,
        },
        IpAddr::V4(_) => bound,
    };
    encode_address(&TargetAddr::Ip(canonical), buf);
}
