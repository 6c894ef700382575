//! Poll interval schedule for still-pending observations.

use std::time::Duration;

/// Starting point of the exponential schedule
pub const BASE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The interval never grows past this multiple of the floor
pub const CEILING_MULTIPLIER: u32 = 4;

/// Monotonically non-decreasing backoff between polls.
///
/// Starts at [`BASE_POLL_INTERVAL`] and doubles on every still-pending
/// observation, clamped to `[floor, CEILING_MULTIPLIER * max(floor, base)]`.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl PollBackoff {
    /// Create a schedule with the given minimum poll interval
    pub fn new(min_poll_interval: Duration) -> Self {
        let ceiling = min_poll_interval
            .max(BASE_POLL_INTERVAL)
            .checked_mul(CEILING_MULTIPLIER)
            .unwrap_or(Duration::MAX);
        Self {
            current: BASE_POLL_INTERVAL,
            floor: min_poll_interval,
            ceiling,
        }
    }

    /// Interval to sleep before the next poll
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.clamp(self.floor, self.ceiling);
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_floor_grows_from_base() {
        let mut backoff = PollBackoff::new(Duration::from_millis(10));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(400),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn test_large_floor_is_respected() {
        let mut backoff = PollBackoff::new(Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.ceiling(), Duration::from_secs(12));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(12));
    }

    #[test]
    fn test_zero_floor_never_busy_loops() {
        let mut backoff = PollBackoff::new(Duration::ZERO);
        assert!(backoff.next_delay() >= BASE_POLL_INTERVAL);
    }

    #[test]
    fn test_huge_floor_saturates_ceiling() {
        for floor in [Duration::from_secs(u64::MAX / 2), Duration::MAX] {
            let mut backoff = PollBackoff::new(floor);
            assert_eq!(backoff.ceiling(), Duration::MAX);
            for _ in 0..80 {
                assert!(backoff.next_delay() >= floor);
            }
        }
    }
}
