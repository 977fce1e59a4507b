//! Client configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::{
    DEFAULT_EVENT_BUFFER, DEFAULT_MAX_COMPRESSED_LIVE_RECORDS, DEFAULT_RECONNECT_DELAY,
    DEFAULT_STATION_LIST_TIMEOUT, DEFAULT_TCP_MAX_SAMPLE_PAYLOAD, DEFAULT_UDP_MAX_SAMPLE_PAYLOAD,
};

use super::client::ClientError;

/// Transport used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Length-prefixed packets over a TCP stream.
    #[default]
    Tcp,
    /// One packet per datagram.
    Udp,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address to connect to.
    pub server_addr: SocketAddr,

    /// Authorisation code identifying this client to the server.
    pub authorisation_code: u64,

    /// Transport to use.
    pub protocol: Protocol,

    /// Compressed live records sent before a full one is forced.
    pub max_compressed_live_records: u32,

    /// Sample bytes per packet; `None` picks the protocol default.
    pub max_sample_payload: Option<usize>,

    /// How long to wait for the station list before resending the handshake.
    pub station_list_timeout: Duration,

    /// Delay between TCP reconnect attempts.
    pub reconnect_delay: Duration,

    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the server and code.
    pub fn new(server_addr: SocketAddr, authorisation_code: u64) -> Self {
        Self {
            server_addr,
            authorisation_code,
            protocol: Protocol::default(),
            max_compressed_live_records: DEFAULT_MAX_COMPRESSED_LIVE_RECORDS,
            max_sample_payload: None,
            station_list_timeout: DEFAULT_STATION_LIST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Sample byte budget per weather data packet.
    pub fn sample_payload_budget(&self) -> usize {
        self.max_sample_payload.unwrap_or(match self.protocol {
            Protocol::Tcp => DEFAULT_TCP_MAX_SAMPLE_PAYLOAD,
            Protocol::Udp => DEFAULT_UDP_MAX_SAMPLE_PAYLOAD,
        })
    }

    /// Check the configuration for values the client cannot work with.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.max_compressed_live_records == 0 {
            return Err(ClientError::InvalidConfig(
                "max_compressed_live_records must be at least 1",
            ));
        }
        if self.max_sample_payload == Some(0) {
            return Err(ClientError::InvalidConfig("max_sample_payload must be at least 1"));
        }
        if self.event_buffer == 0 {
            return Err(ClientError::InvalidConfig("event_buffer must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for a [`ClientConfig`].
#[derive(Debug, Default)]
pub struct WeatherPushClientBuilder {
    server_addr: Option<SocketAddr>,
    authorisation_code: Option<u64>,
    protocol: Protocol,
    max_compressed_live_records: Option<u32>,
    max_sample_payload: Option<usize>,
    station_list_timeout: Option<Duration>,
    reconnect_delay: Option<Duration>,
    event_buffer: Option<usize>,
}

impl WeatherPushClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server address.
    pub fn server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = Some(addr);
        self
    }

    /// Set the authorisation code.
    pub fn authorisation_code(mut self, code: u64) -> Self {
        self.authorisation_code = Some(code);
        self
    }

    /// Set the transport.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set how many compressed live records may go out between full ones.
    pub fn max_compressed_live_records(mut self, count: u32) -> Self {
        self.max_compressed_live_records = Some(count);
        self
    }

    /// Set the per-packet sample byte budget.
    pub fn max_sample_payload(mut self, bytes: usize) -> Self {
        self.max_sample_payload = Some(bytes);
        self
    }

    /// Set the station list timeout.
    pub fn station_list_timeout(mut self, timeout: Duration) -> Self {
        self.station_list_timeout = Some(timeout);
        self
    }

    /// Set the TCP reconnect delay.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Set the event channel capacity.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Build and validate the client configuration.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let server_addr = self
            .server_addr
            .ok_or(ClientError::InvalidConfig("server address is required"))?;
        let authorisation_code = self
            .authorisation_code
            .ok_or(ClientError::InvalidConfig("authorisation code is required"))?;

        let mut config = ClientConfig::new(server_addr, authorisation_code);
        config.protocol = self.protocol;
        config.max_sample_payload = self.max_sample_payload;
        if let Some(count) = self.max_compressed_live_records {
            config.max_compressed_live_records = count;
        }
        if let Some(timeout) = self.station_list_timeout {
            config.station_list_timeout = timeout;
        }
        if let Some(delay) = self.reconnect_delay {
            config.reconnect_delay = delay;
        }
        if let Some(capacity) = self.event_buffer {
            config.event_buffer = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4224".parse().unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = WeatherPushClientBuilder::new()
            .server_addr(addr())
            .authorisation_code(0xDEAD_BEEF)
            .build()
            .unwrap();

        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.max_compressed_live_records, 30);
        assert_eq!(config.sample_payload_budget(), 60_000);
        assert_eq!(config.station_list_timeout, Duration::from_secs(60));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_udp_budget_default() {
        let config = WeatherPushClientBuilder::new()
            .server_addr(addr())
            .authorisation_code(1)
            .protocol(Protocol::Udp)
            .build()
            .unwrap();
        assert_eq!(config.sample_payload_budget(), 450);

        let config = WeatherPushClientBuilder::new()
            .server_addr(addr())
            .authorisation_code(1)
            .protocol(Protocol::Udp)
            .max_sample_payload(1200)
            .build()
            .unwrap();
        assert_eq!(config.sample_payload_budget(), 1200);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        assert!(matches!(
            WeatherPushClientBuilder::new().authorisation_code(1).build(),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(matches!(
            WeatherPushClientBuilder::new().server_addr(addr()).build(),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(matches!(
            WeatherPushClientBuilder::new()
                .server_addr(addr())
                .authorisation_code(1)
                .max_compressed_live_records(0)
                .build(),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(matches!(
            WeatherPushClientBuilder::new()
                .server_addr(addr())
                .authorisation_code(1)
                .max_sample_payload(0)
                .build(),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}
