//! Reconnect backoff policy
//!
//! Exponential growth with downward jitter and a hard ceiling. A session
//! that stayed READY past the stability threshold resets the schedule, so
//! transient flapping does not escalate indefinitely once the switch has
//! been stable.

use std::time::Duration;

use rand::Rng;

/// Backoff tuning. The defaults suit a LAN control channel.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// First retry delay.
    pub initial: Duration,
    /// Hard ceiling on the computed delay.
    pub max: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Fraction of the delay randomly shaved off (0.0 disables jitter).
    pub jitter: f64,
    /// READY time after which the schedule resets to `initial`.
    pub stability_threshold: Duration,
    /// Give up after this many consecutive failures (`None` retries forever).
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.15,
            stability_threshold: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Mutable backoff state for one switch lifecycle.
#[derive(Debug)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Delay before the next attempt. Grows exponentially, never exceeds
    /// the configured maximum (jitter only shortens the delay).
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let base = self.current.min(self.config.max);
        self.current = self
            .current
            .mul_f64(self.config.multiplier.max(1.0))
            .min(self.config.max);
        if self.config.jitter <= 0.0 {
            return base;
        }
        let shave = rand::thread_rng().gen_range(0.0..self.config.jitter);
        base.mul_f64(1.0 - shave)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once the configured attempt budget is spent.
    pub fn exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
    }

    /// Feed back how long the last session stayed READY.
    pub fn note_ready_duration(&mut self, ready_for: Duration) {
        if ready_for >= self.config.stability_threshold {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.15,
            stability_threshold: Duration::from_secs(5),
            max_attempts: None,
        }
    }

    #[test]
    fn delay_is_bounded_by_max() {
        let mut backoff = Backoff::new(config());
        for _ in 0..50 {
            assert!(backoff.next_delay() <= Duration::from_secs(2));
        }
    }

    #[test]
    fn delay_grows_until_ceiling() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: 0.0,
            ..config()
        });
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn stable_ready_period_resets_schedule() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: 0.0,
            ..config()
        });
        for _ in 0..8 {
            backoff.next_delay();
        }
        // Shorter than the threshold: no reset.
        backoff.note_ready_duration(Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));

        backoff.note_ready_duration(Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    proptest::proptest! {
        /// Jitter or not, the computed delay never exceeds the configured
        /// maximum for any tuning.
        #[test]
        fn delay_bounded_for_any_tuning(
            attempts in 1usize..64,
            initial_ms in 1u64..500,
            max_ms in 10u64..5_000,
            jitter in 0.0f64..0.9,
        ) {
            let mut backoff = Backoff::new(BackoffConfig {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
                jitter,
                ..config()
            });
            for _ in 0..attempts {
                proptest::prop_assert!(backoff.next_delay() <= Duration::from_millis(max_ms));
            }
        }
    }

    #[test]
    fn attempt_budget() {
        let mut backoff = Backoff::new(BackoffConfig {
            max_attempts: Some(2),
            ..config()
        });
        assert!(!backoff.exhausted());
        backoff.next_delay();
        assert!(!backoff.exhausted());
        backoff.next_delay();
        assert!(backoff.exhausted());
        backoff.reset();
        assert!(!backoff.exhausted());
    }
}
