//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Everything but RFC 3986 unreserved characters
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Externally reachable base URL, used to build embed URLs
    pub public_url: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Frames buffered per client before new ones are dropped
    pub outbound_queue_capacity: usize,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            public_url: format!("http://localhost:{}", DEFAULT_PORT),
            max_connections: 0, // Unlimited
            outbound_queue_capacity: 256,
            handshake_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            public_url: format!("http://localhost:{}", addr.port()),
            ..Default::default()
        }
    }

    /// Build a config from the process environment
    ///
    /// Reads `PORT`, `BIND_ADDR`, `PUBLIC_URL` and `MAX_CONNECTIONS`.
    /// Unparsable values fall back to defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid PORT, using default");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let mut config = Self::with_addr(SocketAddr::from(([0, 0, 0, 0], port)));

        if let Some(raw) = lookup("BIND_ADDR") {
            match raw.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(_) => tracing::warn!(value = %raw, "Invalid BIND_ADDR, using default"),
            }
        }

        if let Some(url) = lookup("PUBLIC_URL").filter(|url| !url.is_empty()) {
            config.public_url = url;
        }

        if let Some(raw) = lookup("MAX_CONNECTIONS") {
            match raw.parse() {
                Ok(max) => config.max_connections = max,
                Err(_) => tracing::warn!(value = %raw, "Invalid MAX_CONNECTIONS, ignoring"),
            }
        }

        config
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the public base URL
    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set per-client outbound queue capacity
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Viewer-facing URL for a stream; the id is percent-encoded
    pub fn embed_url(&self, stream_id: &str) -> String {
        format!(
            "{}/viewer.html?streamId={}",
            self.public_url.trim_end_matches('/'),
            utf8_percent_encode(stream_id, QUERY_VALUE)
        )
    }
}
