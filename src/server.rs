//! Server shell and option bag.
//!
//! [`ServerBuilder`] collects the pluggable capabilities with sensible
//! defaults; [`Server`] runs the accept loop, spawning one handler task per
//! client connection, and supports graceful shutdown.

use crate::auth::{Authenticator, CredentialStore, NoAuth, PasswordAuth};
use crate::consts::DEFAULT_UDP_BUFFER;
use crate::dialer::{Dialer, DirectDialer};
use crate::error::{Error, Result};
use crate::handler;
use crate::resolver::{DnsResolver, Resolver};
use crate::rules::{PermitAll, RuleSet};
use crate::types::{AsyncStream, AuthContext, SocksCommand, TargetAddr};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Rewrites a request target before authorization and dispatch.
///
/// Useful for destination NAT, split-horizon overrides, or forcing traffic
/// through internal endpoints.
pub trait Rewriter: Send + Sync {
    /// Return the target the request should proceed with.
    fn rewrite(
        &self,
        command: SocksCommand,
        addr: TargetAddr,
        ctx: &AuthContext,
        peer: SocketAddr,
    ) -> TargetAddr;
}

/// Shared, read-only state consulted by every session.
pub(crate) struct ServerContext {
    /// Configured methods in preference order
    pub(crate) authenticators: Vec<Arc<dyn Authenticator>>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) rules: Arc<dyn RuleSet>,
    pub(crate) rewriter: Option<Arc<dyn Rewriter>>,
    pub(crate) dialer: Arc<dyn Dialer>,
    /// Source address for outbound dials and relay sockets
    pub(crate) bind_ip: Option<IpAddr>,
    pub(crate) udp_buffer_size: usize,
    pub(crate) connect_timeout: Duration,
}

/// Option bag for [`Server`].
///
/// Every option has a default: no-auth, the system resolver, an
/// allow-everything rule set, plain kernel sockets, a 64 KiB UDP buffer and
/// a 10 second connect timeout.
pub struct ServerBuilder {
    authenticators: Vec<Arc<dyn Authenticator>>,
    resolver: Arc<dyn Resolver>,
    rules: Arc<dyn RuleSet>,
    rewriter: Option<Arc<dyn Rewriter>>,
    dialer: Arc<dyn Dialer>,
    bind_ip: Option<IpAddr>,
    udp_buffer_size: usize,
    connect_timeout: Duration,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        ServerBuilder {
            authenticators: Vec::new(),
            resolver: Arc::new(DnsResolver),
            rules: Arc::new(PermitAll),
            rewriter: None,
            dialer: Arc::new(DirectDialer),
            bind_ip: None,
            udp_buffer_size: DEFAULT_UDP_BUFFER,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerBuilder {
    /// Append an authentication method.
    ///
    /// Order matters only for server capabilities; the client's listed order
    /// decides which configured method is selected.
    pub fn auth_method(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticators.push(Arc::new(authenticator));
        self
    }

    /// Require username/password authentication against `store`.
    ///
    /// Shorthand for `auth_method(PasswordAuth::new(store))`.
    pub fn credentials(self, store: impl CredentialStore + 'static) -> Self {
        self.auth_method(PasswordAuth::new(store))
    }

    /// Replace the name resolver.
    pub fn resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replace the rule set.
    pub fn rules(mut self, rules: impl RuleSet + 'static) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// Install a request rewriter.
    pub fn rewriter(mut self, rewriter: impl Rewriter + 'static) -> Self {
        self.rewriter = Some(Arc::new(rewriter));
        self
    }

    /// Replace the socket factory.
    pub fn dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Arc::new(dialer);
        self
    }

    /// Source IP for outbound dials and the bind address of BIND listeners
    /// and UDP relay sockets.
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = Some(ip);
        self
    }

    /// Receive buffer size of the UDP relay; datagrams that do not fit are
    /// dropped.
    pub fn udp_buffer_size(mut self, size: usize) -> Self {
        self.udp_buffer_size = size;
        self
    }

    /// Timeout for outbound CONNECT dials.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Finalize the options into a [`Server`].
    pub fn build(self) -> Server {
        let (shutdown, _) = broadcast::channel(1);
        Server {
            ctx: Arc::new(self.into_context()),
            shutdown,
        }
    }

    pub(crate) fn into_context(self) -> ServerContext {
        let mut authenticators = self.authenticators;
        if authenticators.is_empty() {
            authenticators.push(Arc::new(NoAuth));
        }

        ServerContext {
            authenticators,
            resolver: self.resolver,
            rules: self.rules,
            rewriter: self.rewriter,
            dialer: self.dialer,
            bind_ip: self.bind_ip,
            udp_buffer_size: self.udp_buffer_size,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// A SOCKS5 proxy server.
///
/// Cheap to clone; clones share the capability set and the shutdown signal,
/// so one handle can serve while another shuts the accept loop down.
#[derive(Clone)]
pub struct Server {
    ctx: Arc<ServerContext>,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    /// Start collecting options.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// A server with every option at its default.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Bind `addr` and serve until shutdown.
    pub async fn listen_and_serve(&self, addr: impl ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an existing listener until shutdown.
    ///
    /// Returns [`Error::Shutdown`] after [`shutdown`](Self::shutdown) is
    /// called; accepted sessions keep running to natural termination.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!("SOCKS5 server listening on {}", local);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("SOCKS5 server on {} shutting down", local);
                    return Err(Error::Shutdown);
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        let local_ip = stream.local_addr().ok().map(|addr| addr.ip());
                        if let Err(e) = handler::handle_connection(stream, peer, local_ip, &ctx).await {
                            warn!("session from {} ended: {}", peer, e);
                        }
                    });
                }
            }
        }
    }

    /// Drive the protocol on an already-established client stream.
    ///
    /// Embedding entry point for callers that accept connections themselves
    /// (or carry them over other transports). `peer` is the client's address
    /// as seen by the caller.
    pub async fn serve_stream<S>(&self, stream: S, peer: SocketAddr) -> Result<()>
    where
        S: AsyncStream,
    {
        handler::handle_connection(stream, peer, None, &self.ctx).await
    }

    /// Stop the accept loop; in-flight sessions drain.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
