//! The "no authentication required" method (0x00).

use super::Authenticator;
use crate::consts::{METHOD_NO_AUTH, SOCKS_VERSION};
use crate::error::Result;
use crate::types::{AsyncStream, AuthContext};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;

/// Accepts every client without a sub-negotiation.
///
/// The default method of a server built without explicit authenticators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    fn method(&self) -> u8 {
        METHOD_NO_AUTH
    }

    async fn authenticate(
        &self,
        stream: &mut dyn AsyncStream,
        _peer: SocketAddr,
    ) -> Result<AuthContext> {
        stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
        stream.flush().await?;
        Ok(AuthContext::new(METHOD_NO_AUTH))
    }
}
