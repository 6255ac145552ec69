//! Authentication negotiation
//!
//! Reads the client greeting, picks the first client-offered method the
//! server supports, and hands the stream to that method's sub-negotiation.

mod no_auth;
mod password;

pub use no_auth::NoAuth;
pub use password::{CredentialStore, PasswordAuth, StaticCredentials};

use crate::consts::*;
use crate::error::{Error, Result};
use crate::types::{AsyncStream, AuthContext};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// A SOCKS5 authentication method.
///
/// Implementations announce their method code and run the method's
/// sub-negotiation on the client stream. The method-select frame
/// `{0x05, code}` is written by the implementation itself, so a method can
/// refuse before committing any bytes.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Method code advertised to clients.
    fn method(&self) -> u8;

    /// Run the sub-negotiation and produce the session's auth context.
    async fn authenticate(
        &self,
        stream: &mut dyn AsyncStream,
        peer: SocketAddr,
    ) -> Result<AuthContext>;
}

/// Negotiate an authentication method with a freshly accepted client.
///
/// # Greeting Format
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// The first method in the client's list that matches a configured
/// authenticator wins. With no match the server answers `{0x05, 0xFF}` and
/// the connection is torn down.
pub async fn negotiate(
    stream: &mut dyn AsyncStream,
    peer: SocketAddr,
    authenticators: &[Arc<dyn Authenticator>],
) -> Result<AuthContext> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS_VERSION {
        return Err(Error::UnsupportedVersion(header[0]));
    }

    let nmethods = header[1] as usize;
    if nmethods == 0 {
        return Err(Error::MalformedFrame("empty method list"));
    }

    let mut methods = vec![0u8; nmethods];
    stream.read_exact(&mut methods).await?;

    for method in &methods {
        if let Some(authenticator) = authenticators.iter().find(|a| a.method() == *method) {
            debug!("client {} negotiating method {:#04x}", peer, method);
            return authenticator.authenticate(stream, peer).await;
        }
    }

    debug!(
        "client {} offered no supported method out of {:?}",
        peer, methods
    );
    stream
        .write_all(&[SOCKS_VERSION, METHOD_NO_ACCEPTABLE])
        .await?;
    stream.flush().await?;

    Err(Error::NoSupportedAuth)
}
