//! Declarative configuration
//!
//! A TOML-friendly layer over the option bag for deployments that prefer a
//! config file to builder calls. Only the statically describable options are
//! covered; capability objects (resolver, rules, dialer) stay code-side.

use crate::auth::StaticCredentials;
use crate::error::{Error, Result};
use crate::server::ServerBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::consts::DEFAULT_UDP_BUFFER;

/// Statically describable server options.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the caller should bind, e.g. `"127.0.0.1:1080"`
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Username → password table; non-empty enables user/pass authentication
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Source IP for outbound dials and relay sockets
    #[serde(default)]
    pub bind_ip: Option<IpAddr>,

    /// UDP relay receive buffer in bytes
    #[serde(default = "default_udp_buffer")]
    pub udp_buffer_size: usize,

    /// Outbound CONNECT dial timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_udp_buffer() -> usize {
    DEFAULT_UDP_BUFFER
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_addr: default_listen_addr(),
            users: HashMap::new(),
            bind_ip: None,
            udp_buffer_size: default_udp_buffer(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ProxyConfig {
    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::Config("listen_addr must not be empty".to_string()));
        }
        if self.udp_buffer_size < 512 {
            return Err(Error::Config(
                "udp_buffer_size below 512 cannot hold a datagram header".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert into a [`ServerBuilder`] carrying these options.
    pub fn into_builder(self) -> ServerBuilder {
        let mut builder = ServerBuilder::default()
            .udp_buffer_size(self.udp_buffer_size)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs));

        if let Some(ip) = self.bind_ip {
            builder = builder.bind_ip(ip);
        }

        if !self.users.is_empty() {
            let store: StaticCredentials = self.users.into_iter().collect();
            builder = builder.credentials(store);
        }

        builder
    }
}

/// Load configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProxyConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(format!("failed to read {:?}: {}", path.as_ref(), e)))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<ProxyConfig> {
    let config: ProxyConfig =
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
