//! SOCKS5 module for Sockrelay
//!
//! This module implements the server side of SOCKS5 (RFC 1928) for the
//! CONNECT command: method negotiation, request parsing, upstream
//! connection, replies and the bidirectional relay.

mod codec;
mod connector;
mod consts;
mod handshake;
mod relay;
mod reply;
mod request;
mod session;
mod types;

pub use codec::{decode_address, encode_address, encode_bound_address};
pub use connector::{Upstream, UpstreamConnector};
pub use consts::*;
pub use handshake::{select_auth_method, send_method_reply, AuthMethod, MethodSelection};
pub use relay::{relay, Direction, RelayConfig, RelayStats};
pub use reply::Reply;
pub use request::ConnectRequest;
pub use session::{Phase, Session};
pub use types::{SocksCommand, TargetAddr};
