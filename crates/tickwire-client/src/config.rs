use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tickwire_frame::{DEFAULT_MAX_PAYLOAD, PING};

use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Default connect deadline.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of messages delivered per pump tick.
pub const DEFAULT_PER_TICK_LIMIT: usize = 3;
/// Payload carried by heartbeat frames unless configured otherwise.
pub const DEFAULT_HEARTBEAT_PAYLOAD: &[u8] = b"tickwire";

/// Runtime configuration for a client connection.
#[derive(Clone)]
pub struct ClientConfig {
    /// Upper bound for a single connect attempt, across all resolved addresses.
    pub connect_timeout: Duration,
    /// Period between heartbeat frames while connected.
    pub heartbeat_interval: Duration,
    /// Protocol id used for heartbeat frames. Inbound frames with this id
    /// are discarded rather than queued.
    pub heartbeat_protocol: u16,
    /// Body of each heartbeat frame.
    pub heartbeat_payload: Bytes,
    /// Messages delivered per `tick`. Zero pauses delivery.
    pub per_tick_limit: usize,
    /// Largest payload accepted in either direction.
    pub max_payload_size: usize,
    /// Inbound queue capacity; `None` for unbounded.
    pub queue_capacity: Option<usize>,
    /// Socket read timeout; bounds how long the receive loop takes to
    /// notice a stop request.
    pub poll_interval: Duration,
    /// How long `close` waits for each background thread.
    pub close_timeout: Duration,
    /// Socket write timeout; an expired write counts as a lost connection.
    pub write_timeout: Option<Duration>,
    /// Also enqueue locally sent messages into the inbound queue.
    pub loopback_sends: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_protocol: PING,
            heartbeat_payload: Bytes::from_static(DEFAULT_HEARTBEAT_PAYLOAD),
            per_tick_limit: DEFAULT_PER_TICK_LIMIT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            poll_interval: Duration::from_millis(100),
            close_timeout: Duration::from_secs(1),
            write_timeout: Some(Duration::from_secs(5)),
            loopback_sends: false,
        }
    }
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_heartbeat(mut self, protocol: u16, payload: impl Into<Bytes>) -> Self {
        self.heartbeat_protocol = protocol;
        self.heartbeat_payload = payload.into();
        self
    }

    pub fn with_per_tick_limit(mut self, limit: usize) -> Self {
        self.per_tick_limit = limit;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_loopback_sends(mut self, enabled: bool) -> Self {
        self.loopback_sends = enabled;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("heartbeat_protocol", &self.heartbeat_protocol)
            .field(
                "heartbeat_payload",
                &format_args!("<{} bytes>", self.heartbeat_payload.len()),
            )
            .field("per_tick_limit", &self.per_tick_limit)
            .field("max_payload_size", &self.max_payload_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("poll_interval", &self.poll_interval)
            .field("close_timeout", &self.close_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("loopback_sends", &self.loopback_sends)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_millis(5000));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.heartbeat_protocol, PING);
        assert_eq!(config.heartbeat_payload.as_ref(), b"tickwire");
        assert_eq!(config.per_tick_limit, 3);
        assert_eq!(config.queue_capacity, Some(4096));
        assert!(!config.loopback_sends);
    }

    #[test]
    fn builders_override_fields() {
        let config = ClientConfig::default()
            .with_connect_timeout(Duration::from_millis(250))
            .with_heartbeat(7, &b"hb"[..])
            .with_per_tick_limit(0)
            .with_queue_capacity(None)
            .with_loopback_sends(true);

        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.heartbeat_protocol, 7);
        assert_eq!(config.heartbeat_payload.as_ref(), b"hb");
        assert_eq!(config.per_tick_limit, 0);
        assert_eq!(config.queue_capacity, None);
        assert!(config.loopback_sends);
    }
}
