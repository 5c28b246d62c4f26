use shared::{
    ACCEPT_POLL_TIMEOUT, COUNTER_LOCK_TIMEOUT, ERROR_GRACE, EXIT_GRACE,
    GRACEFUL_DISCONNECT_TIMEOUT, LONG_RECEIVE_TIMEOUT, SHORT_RECEIVE_TIMEOUT,
};
use std::time::Duration;

/// Every bound the server waits on. Defaults are the production values;
/// tests shrink them to keep runs short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Machine-paced receives (join request)
    pub short_receive: Duration,
    /// Human-paced receives and rendezvous waits
    pub long_receive: Duration,
    pub graceful_disconnect: Duration,
    pub counter_lock: Duration,
    pub accept_poll: Duration,
    /// How often a blocked rendezvous wait looks at the shutdown signals
    pub rendezvous_slice: Duration,
    pub exit_grace: Duration,
    pub error_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            short_receive: SHORT_RECEIVE_TIMEOUT,
            long_receive: LONG_RECEIVE_TIMEOUT,
            graceful_disconnect: GRACEFUL_DISCONNECT_TIMEOUT,
            counter_lock: COUNTER_LOCK_TIMEOUT,
            accept_poll: ACCEPT_POLL_TIMEOUT,
            rendezvous_slice: Duration::from_millis(250),
            exit_grace: EXIT_GRACE,
            error_grace: ERROR_GRACE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub timeouts: Timeouts,
}

impl ServerConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:8080")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.short_receive, Duration::from_secs(15));
        assert_eq!(timeouts.long_receive, Duration::from_secs(600));
        assert_eq!(timeouts.graceful_disconnect, Duration::from_secs(2));
        assert_eq!(timeouts.counter_lock, Duration::from_secs(2));
        assert!(timeouts.rendezvous_slice < timeouts.short_receive);
        assert!(timeouts.error_grace <= timeouts.exit_grace);
    }

    #[test]
    fn test_config_builder() {
        let timeouts = Timeouts {
            short_receive: Duration::from_secs(1),
            ..Timeouts::default()
        };
        let config = ServerConfig::new("0.0.0.0:9000").with_timeouts(timeouts);
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.timeouts.short_receive, Duration::from_secs(1));
    }
}
