//! Protocol timing configuration shared by client and server.

use super::constants::*;
use super::error::NetcodeError;

/// Timing and identity parameters both endpoints must agree on.
///
/// All durations are logical seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientServerConfig {
    /// Protocol identifier mixed into every authenticated packet.
    pub protocol_id: u64,

    /// Interval between connection request / challenge response resends.
    pub connection_request_send_interval: f64,

    /// Negotiation phase gives up after this long without a reply.
    pub connection_negotiation_timeout: f64,

    /// Maximum silence on the send side while connected.
    pub keep_alive_interval: f64,

    /// Connected peer is considered gone after this long without packets.
    pub connection_timeout: f64,
}

impl Default for ClientServerConfig {
    fn default() -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID,
            connection_request_send_interval: CONNECTION_REQUEST_SEND_INTERVAL,
            connection_negotiation_timeout: CONNECTION_NEGOTIATION_TIMEOUT,
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
            connection_timeout: CONNECTION_TIMEOUT,
        }
    }
}

impl ClientServerConfig {
    /// Check that every interval is positive and that keep-alives are sent
    /// more often than the peer would time out.
    pub fn validate(&self) -> Result<(), NetcodeError> {
        let positive = [
            ("connection_request_send_interval", self.connection_request_send_interval),
            ("connection_negotiation_timeout", self.connection_negotiation_timeout),
            ("keep_alive_interval", self.keep_alive_interval),
            ("connection_timeout", self.connection_timeout),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(NetcodeError::Config(format!(
                    "{name} must be a positive number of seconds, got {value}"
                )));
            }
        }

        if self.keep_alive_interval >= self.connection_timeout {
            return Err(NetcodeError::Config(format!(
                "keep_alive_interval ({}) must be shorter than connection_timeout ({})",
                self.keep_alive_interval, self.connection_timeout
            )));
        }

        Ok(())
    }
}
