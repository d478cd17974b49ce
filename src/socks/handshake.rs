//! SOCKS5 method negotiation
//!
//! Parses the client's version identifier/method selection message and
//! picks the authentication method. Only "no authentication required" is
//! offered by this proxy.
//!
//! ```text
//! +----+----------+----------+        +----+--------+
//! |VER | NMETHODS | METHODS  |  --->  |VER | METHOD |
//! +----+----------+----------+        +----+--------+
//! | 1  |    1     | 1 to 255 |        | 1  |   1    |
//! +----+----------+----------+        +----+--------+
//! ```

use super::consts::*;
use crate::error::Socks5Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Authentication method chosen for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// None of the offered methods is acceptable
    NotAcceptable,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::NotAcceptable => SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE,
        }
    }
}

/// A complete method selection message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelection {
    /// Methods offered by the client, in wire order
    pub methods: Vec<u8>,
}

impl MethodSelection {
    /// Try to decode a method selection message from the start of `buf`.
    ///
    /// Returns `Ok(None)` while the message is still incomplete, so callers
    /// can keep reading. A wrong version byte is rejected as soon as it is
    /// seen.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, Socks5Error> {
        let Some(&version) = buf.first() else {
            return Ok(None);
        };
        if version != SOCKS5_VERSION {
            return Err(Socks5Error::UnsupportedVersion(version));
        }

        let Some(&num_methods) = buf.get(1) else {
            return Ok(None);
        };
        let total = 2 + num_methods as usize;
        if buf.len() < total {
            return Ok(None);
        }

        let methods = buf[2..total].to_vec();
        Ok(Some((MethodSelection { methods }, total)))
    }

    /// Select the method to answer with
    pub fn negotiate(&self) -> AuthMethod {
        select_auth_method(&self.methods)
    }
}

/// Select "no authentication" if offered, otherwise nothing is acceptable
pub fn select_auth_method(methods: &[u8]) -> AuthMethod {
    if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        AuthMethod::None
    } else {
        AuthMethod::NotAcceptable
    }
}

/// Send `VER | METHOD` to the client
pub async fn send_method_reply<S>(stream: &mut S, method: AuthMethod) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_VERSION, method.to_byte()]).await?;
    stream.flush().await
}
