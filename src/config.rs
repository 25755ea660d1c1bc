//! Configuration for Tandem
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{Result, TandemError};

/// Network configuration shared by hosts, connections and connect helpers
#[derive(Debug, Clone)]
pub struct NetConfig {
    // -------------------------------------------------------------------------
    // Host Configuration
    // -------------------------------------------------------------------------
    /// Period of the accept / prune tick on a host
    pub host_tick_interval: Duration,

    /// Period of the UDP receive pass on a hybrid host
    pub udp_poll_interval: Duration,

    /// How long an accepted TCP socket may wait for its UDP token
    pub handshake_timeout: Duration,

    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// How long a client waits for the token and the UDP acknowledgment
    pub handshake_window: Duration,

    /// How often the client resends its UDP token while waiting for the ack
    pub token_resend_interval: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Size of a single socket read on the reliable transport
    pub receive_chunk_size: usize,

    /// Largest payload a frame may declare
    pub max_payload_size: u32,

    /// Disable Nagle's algorithm on TCP sockets
    pub nodelay: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            host_tick_interval: Duration::from_millis(250),
            udp_poll_interval: Duration::from_millis(10),
            handshake_timeout: Duration::from_secs(5),
            handshake_window: Duration::from_secs(5),
            token_resend_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
            receive_chunk_size: 1024,
            max_payload_size: 16 * 1024 * 1024, // 16 MB
            nodelay: true,
        }
    }
}

impl NetConfig {
    /// Create a new config builder
    pub fn builder() -> NetConfigBuilder {
        NetConfigBuilder::default()
    }

    /// Reject values the transport cannot run with
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("host_tick_interval", self.host_tick_interval),
            ("udp_poll_interval", self.udp_poll_interval),
            ("handshake_timeout", self.handshake_timeout),
            ("handshake_window", self.handshake_window),
            ("token_resend_interval", self.token_resend_interval),
            ("connect_timeout", self.connect_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(TandemError::Config(format!("{} must be non-zero", name)));
            }
        }

        if self.receive_chunk_size == 0 {
            return Err(TandemError::Config(
                "receive_chunk_size must be non-zero".to_string(),
            ));
        }
        if self.max_payload_size == 0 || self.max_payload_size > i32::MAX as u32 {
            return Err(TandemError::Config(format!(
                "max_payload_size must be in 1..={}",
                i32::MAX
            )));
        }

        Ok(())
    }
}

/// Builder for NetConfig
#[derive(Default)]
pub struct NetConfigBuilder {
    config: NetConfig,
}

impl NetConfigBuilder {
    /// Set the host accept / prune tick period
    pub fn host_tick_interval(mut self, interval: Duration) -> Self {
        self.config.host_tick_interval = interval;
        self
    }

    /// Set the hybrid host UDP receive period
    pub fn udp_poll_interval(mut self, interval: Duration) -> Self {
        self.config.udp_poll_interval = interval;
        self
    }

    /// Set the host-side pending handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the client-side handshake window
    pub fn handshake_window(mut self, window: Duration) -> Self {
        self.config.handshake_window = window;
        self
    }

    /// Set the client token resend interval
    pub fn token_resend_interval(mut self, interval: Duration) -> Self {
        self.config.token_resend_interval = interval;
        self
    }

    /// Set the TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the socket read chunk size (in bytes)
    pub fn receive_chunk_size(mut self, size: usize) -> Self {
        self.config.receive_chunk_size = size;
        self
    }

    /// Set the largest accepted frame payload (in bytes)
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    pub fn build(self) -> NetConfig {
        self.config
    }
}
