//! Reconnect backoff.

use std::time::Duration;

/// Default delays between reconnect attempts.
pub const DEFAULT_SCHEDULE: [Duration; 4] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(5),
];

/// Tracks consecutive failed attempts and picks the delay before the next
/// one.
///
/// Attempt `n` (1-based) waits `schedule[n - 1]`; once the schedule runs out
/// the last delay is used for every further attempt. Retries never stop on
/// their own.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    schedule: Vec<Duration>,
    attempt: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEDULE.to_vec())
    }
}

impl ReconnectPolicy {
    /// Creates a policy with the given schedule.
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self {
            schedule,
            attempt: 0,
        }
    }

    /// Delay before attempt `attempt`. Attempt 0 does not wait.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let index = (attempt as usize - 1).min(self.schedule.len().saturating_sub(1));
        self.schedule.get(index).copied().unwrap_or_default()
    }

    /// Records a failure and returns the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay_for(self.attempt)
    }

    /// Number of consecutive failures since the last successful session.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Clears the failure count.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_schedule_then_holds() {
        let mut policy = ReconnectPolicy::default();
        let delays: Vec<_> = (0..7).map(|_| policy.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
        assert_eq!(policy.attempt(), 7);
    }

    #[test]
    fn reset_starts_over() {
        let mut policy = ReconnectPolicy::default();
        policy.next_delay();
        policy.next_delay();
        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn zero_attempt_and_empty_schedule() {
        let policy = ReconnectPolicy::new(Vec::new());
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }
}
