//! Client configuration

use std::time::Duration;

/// Signaling client options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the signaling server (`ws://host:port`)
    pub server_url: String,

    /// Stream to publish or watch
    ///
    /// Streamers without one get a server-generated id.
    pub stream_id: Option<String>,

    /// Capacity of the driver event channel
    pub event_capacity: usize,

    /// Inbound messages buffered between the socket reader and the driver
    pub inbound_capacity: usize,

    /// WebSocket connect must complete within this time
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a config for `server_url`
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            stream_id: None,
            event_capacity: 64,
            inbound_capacity: 256,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the stream id
    pub fn stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the inbound message buffer
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("ws://localhost:3000")
            .stream_id("cam-1")
            .event_capacity(0)
            .connect_timeout(Duration::from_secs(3));

        assert_eq!(config.server_url, "ws://localhost:3000");
        assert_eq!(config.stream_id.as_deref(), Some("cam-1"));
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.inbound_capacity, 256);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }
}
