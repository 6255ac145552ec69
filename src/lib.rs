//! # Soxide - Embeddable SOCKS5 Proxy Server
//!
//! Soxide implements the server side of SOCKS protocol version 5 (RFC 1928)
//! with username/password authentication (RFC 1929). All three commands are
//! supported: CONNECT, BIND and UDP ASSOCIATE.
//!
//! ## Features
//!
//! - **Pluggable Authentication**: no-auth and user/pass built in; any
//!   method can be added through the [`Authenticator`] trait
//! - **Access Control**: every request passes a [`RuleSet`] before any
//!   outbound socket is opened
//! - **Pluggable Resolution and Dialing**: domain lookup and socket creation
//!   go through the [`Resolver`] and [`Dialer`] seams
//! - **Full UDP ASSOCIATE Support**: encapsulation relay whose lifetime is
//!   tied to the control connection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soxide::{Server, StaticCredentials};
//!
//! #[tokio::main]
//! async fn main() -> soxide::Result<()> {
//!     let server = Server::builder()
//!         .credentials([("foo", "bar")].into_iter().collect::<StaticCredentials>())
//!         .build();
//!
//!     server.listen_and_serve("127.0.0.1:1080").await
//! }
//! ```
//!
//! ## Architecture
//!
//! The accept loop hands each connection to an independent handler task that
//! drives the protocol state machine:
//!
//! ```text
//! greeting -> method negotiation -> auth -> request -> rules -> resolve
//!          -> CONNECT | BIND | UDP ASSOCIATE data-plane
//! ```
//!
//! Embedders that already own their connections can skip the accept loop and
//! call [`Server::serve_stream`] per client.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
mod bind;
pub mod command;
pub mod config;
pub mod consts;
mod dialer;
mod error;
mod handler;
mod resolver;
mod rules;
mod server;
mod tcp_relay;
mod types;
pub mod udp;

pub use auth::{Authenticator, CredentialStore, NoAuth, PasswordAuth, StaticCredentials};
pub use config::{load_config, parse_config, ProxyConfig};
pub use dialer::{Dialer, DirectDialer};
pub use error::{Error, ReplyCode, Result};
pub use resolver::{DnsResolver, Resolver, StaticResolver};
pub use rules::{PermitAll, PermitCommand, RuleSet};
pub use server::{Rewriter, Server, ServerBuilder};
pub use tcp_relay::relay_tcp;
pub use types::{AsyncStream, AuthContext, SocksCommand, TargetAddr};

/// Version of the soxide library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
