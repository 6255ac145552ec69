//! Username/password authentication (RFC 1929).

use super::Authenticator;
use crate::consts::*;
use crate::error::{Error, Result};
use crate::types::{AsyncStream, AuthContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Verifies a username/password pair.
///
/// Shared read-only by every session; implementations with interior
/// mutability must synchronize internally.
pub trait CredentialStore: Send + Sync {
    /// Whether the pair is valid.
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// In-memory credential store backed by a map.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    /// Empty store; rejects everyone until users are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub fn insert(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.users.insert(username.into(), password.into());
    }
}

impl CredentialStore for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.users.get(username).map(String::as_str) == Some(password)
    }
}

impl<U: Into<String>, P: Into<String>> FromIterator<(U, P)> for StaticCredentials {
    fn from_iter<T: IntoIterator<Item = (U, P)>>(iter: T) -> Self {
        StaticCredentials {
            users: iter
                .into_iter()
                .map(|(u, p)| (u.into(), p.into()))
                .collect(),
        }
    }
}

/// Username/password method (0x02) over a [`CredentialStore`].
///
/// # Sub-negotiation Format
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds `{0x01, STATUS}` with status 0 on success, 1 on failure.
#[derive(Debug, Clone)]
pub struct PasswordAuth<C> {
    store: C,
}

impl<C: CredentialStore> PasswordAuth<C> {
    /// Wrap a credential store.
    pub fn new(store: C) -> Self {
        PasswordAuth { store }
    }
}

#[async_trait]
impl<C: CredentialStore> Authenticator for PasswordAuth<C> {
    fn method(&self) -> u8 {
        METHOD_USER_PASS
    }

    async fn authenticate(
        &self,
        stream: &mut dyn AsyncStream,
        peer: SocketAddr,
    ) -> Result<AuthContext> {
        stream.write_all(&[SOCKS_VERSION, METHOD_USER_PASS]).await?;
        stream.flush().await?;

        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;

        if header[0] != AUTH_VERSION {
            send_status(stream, AUTH_FAILURE).await?;
            return Err(Error::MalformedFrame("bad auth sub-negotiation version"));
        }

        let username = read_field(stream, header[1] as usize).await?;

        let mut plen = [0u8; 1];
        stream.read_exact(&mut plen).await?;
        let password = read_field(stream, plen[0] as usize).await?;

        if self.store.verify(&username, &password) {
            send_status(stream, AUTH_SUCCESS).await?;
            debug!("client {} authenticated as {}", peer, username);

            let mut ctx = AuthContext::new(METHOD_USER_PASS);
            ctx.payload.insert("username".to_string(), username);
            ctx.payload.insert("password".to_string(), password);
            Ok(ctx)
        } else {
            send_status(stream, AUTH_FAILURE).await?;
            debug!("client {} failed authentication as {}", peer, username);
            Err(Error::UserAuthFailed)
        }
    }
}

async fn read_field(stream: &mut dyn AsyncStream, len: usize) -> Result<String> {
    if len == 0 {
        send_status(stream, AUTH_FAILURE).await?;
        return Err(Error::MalformedFrame("empty credential field"));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|_| Error::MalformedFrame("credential field is not UTF-8"))
}

async fn send_status(stream: &mut dyn AsyncStream, status: u8) -> Result<()> {
    stream.write_all(&[AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
