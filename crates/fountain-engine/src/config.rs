//! Engine configuration.

use std::time::Duration;

use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::reconnect::DEFAULT_SCHEDULE;

/// Connect timeouts below this are accepted but tend to fail on busy
/// adapters.
pub const RECOMMENDED_MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing and sizing parameters of the connection engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a single connect attempt may take.
    pub connect_timeout: Duration,

    /// How long a command waits for its reply.
    pub command_timeout: Duration,

    /// How long a single GATT write may take.
    pub write_timeout: Duration,

    /// Interval between keep-alive rounds while ready.
    pub heartbeat_interval: Duration,

    /// Inbound silence after which the link is considered lost.
    pub silence_window: Duration,

    /// Delays between reconnect attempts. The last entry repeats forever.
    pub reconnect_schedule: Vec<Duration>,

    /// Capacity of the outbound command queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(60),
            silence_window: Duration::from_secs(180),
            reconnect_schedule: DEFAULT_SCHEDULE.to_vec(),
            queue_capacity: 10,
        }
    }
}

impl EngineConfig {
    /// Builder: set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Builder: set write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Builder: set heartbeat interval and silence window.
    pub fn with_heartbeat(mut self, interval: Duration, silence_window: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.silence_window = silence_window;
        self
    }

    /// Builder: set reconnect schedule.
    pub fn with_reconnect_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.reconnect_schedule = schedule;
        self
    }

    /// Builder: set outbound queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> EngineResult<()> {
        let timings = [
            ("connect_timeout", self.connect_timeout),
            ("command_timeout", self.command_timeout),
            ("write_timeout", self.write_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("silence_window", self.silence_window),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, value)| value.is_zero()) {
            return Err(EngineError::config(format!("{name} must be greater than zero")));
        }

        if self.silence_window <= self.heartbeat_interval {
            return Err(EngineError::config(format!(
                "silence_window ({:?}) must be longer than heartbeat_interval ({:?})",
                self.silence_window, self.heartbeat_interval
            )));
        }

        if self.reconnect_schedule.is_empty() {
            return Err(EngineError::config("reconnect_schedule must not be empty"));
        }

        if self.queue_capacity == 0 {
            return Err(EngineError::config("queue_capacity must be at least 1"));
        }

        if self.connect_timeout < RECOMMENDED_MIN_CONNECT_TIMEOUT {
            warn!(
                connect_timeout_ms = self.connect_timeout.as_millis() as u64,
                "Connect timeout is shorter than recommended"
            );
        }

        Ok(())
    }
}
