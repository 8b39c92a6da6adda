use std::time::Duration;

use serde::Serialize;

/// Retry schedule owned by a single loop.
///
/// The delay grows as `min_interval + floor(expm1(retries))`, which stays close
/// to `min_interval` for the first few failures and then climbs towards
/// `max_interval`. Once `max_retries` is reached every delay is `max_interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryConfig {
    pub min_interval: u64,
    pub max_interval: u64,
    pub max_retries: u32,
    pub current_retries: u32,
}

impl RetryConfig {
    pub fn new(min_interval: u64, max_interval: u64) -> Self {
        let max_retries = if max_interval > 1 {
            (max_interval as f64).ln().floor() as u32
        } else {
            0
        };
        Self {
            min_interval,
            max_interval,
            max_retries,
            current_retries: 0,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        if self.current_retries >= self.max_retries {
            return self.max_interval;
        }
        let growth = f64::from(self.current_retries).exp_m1().floor() as u64;
        self.max_interval.min(self.min_interval.saturating_add(growth))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms())
    }

    /// Returns the delay for the current attempt, then counts the attempt.
    pub fn increase(&mut self) -> Duration {
        let delay = self.delay();
        if self.current_retries < self.max_retries {
            self.current_retries += 1;
        }
        delay
    }

    pub fn reset(&mut self) {
        self.current_retries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retries_follows_natural_log_of_max_interval() {
        let config = RetryConfig::new(1000, 240_000);
        assert_eq!(config.max_retries, 12);
        assert_eq!(config.current_retries, 0);
    }

    #[test]
    fn delay_grows_gently_from_min_interval() {
        let mut config = RetryConfig::new(1000, 240_000);
        assert_eq!(config.delay_ms(), 1000);

        config.current_retries = 5;
        assert_eq!(config.delay_ms(), 1147);

        config.current_retries = 11;
        assert_eq!(config.delay_ms(), 60_873);
    }

    #[test]
    fn increase_is_monotonic_then_clamps_at_max_interval() {
        let mut config = RetryConfig::new(1000, 240_000);
        let mut previous = Duration::ZERO;
        for _ in 0..config.max_retries {
            let delay = config.increase();
            assert!(delay >= previous);
            previous = delay;
        }
        assert_eq!(config.current_retries, config.max_retries);
        for _ in 0..5 {
            assert_eq!(config.increase(), Duration::from_millis(240_000));
        }
    }

    #[test]
    fn increase_returns_delay_before_counting() {
        let mut config = RetryConfig::new(1000, 240_000);
        assert_eq!(config.increase(), Duration::from_millis(1000));
        assert_eq!(config.current_retries, 1);
        assert_eq!(config.increase(), Duration::from_millis(1001));
    }

    #[test]
    fn reset_returns_to_min_interval() {
        let mut config = RetryConfig::new(1000, 240_000);
        for _ in 0..7 {
            config.increase();
        }
        config.reset();
        assert_eq!(config.current_retries, 0);
        assert_eq!(config.delay(), Duration::from_millis(1000));
    }

    #[test]
    fn tiny_max_interval_never_retries_below_it() {
        let config = RetryConfig::new(1, 1);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.delay_ms(), 1);
    }
}
