//! Reconnect delay policy for the STOMP session

use std::time::Duration;

use rand::Rng;

use crate::config::StompConfig;

/// Reconnect policy configuration.
///
/// The default is a fixed delay: `multiplier = 1.0` and no jitter.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt in milliseconds (0 disables reconnection)
    pub delay_ms: u64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied after each failed attempt
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(5000))
    }
}

impl ReconnectPolicy {
    /// Reconnect after the same delay every time
    pub fn fixed(delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Never reconnect
    pub fn disabled() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn from_config(config: &StompConfig) -> Self {
        let delay = config.reconnect_delay();
        if delay.is_zero() {
            return Self::disabled();
        }

        let delay_ms = delay.as_millis() as u64;
        Self {
            delay_ms,
            max_delay_ms: config.reconnect_max_delay_ms.max(delay_ms),
            multiplier: config.reconnect_multiplier.max(1.0),
            jitter_factor: config.reconnect_jitter.clamp(0.0, 1.0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.delay_ms > 0
    }
}

/// Stateful delay calculator driven by a [`ReconnectPolicy`]
pub struct ReconnectBackoff {
    policy: ReconnectPolicy,
    current_delay_ms: u64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let initial = policy.delay_ms;
        Self {
            policy,
            current_delay_ms: initial,
            attempt: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_enabled()
    }

    /// Get the delay before the next reconnect attempt
    pub fn next_delay(&mut self) -> Duration {
        let base_delay = if self.attempt == 0 {
            self.policy.delay_ms as f64
        } else {
            self.current_delay_ms as f64 * self.policy.multiplier
        };
        let capped_delay = base_delay.min(self.policy.max_delay_ms as f64);
        self.attempt += 1;

        let final_delay = if self.policy.jitter_factor > 0.0 && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.policy.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (capped_delay + jitter).max(1.0) as u64
        } else {
            capped_delay.max(1.0) as u64
        };

        self.current_delay_ms = capped_delay as u64;

        Duration::from_millis(final_delay)
    }

    /// Reset after a successful handshake
    pub fn reset(&mut self) {
        self.current_delay_ms = self.policy.delay_ms;
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy::fixed(Duration::from_millis(5000)));

        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
        }
        assert_eq!(backoff.attempt(), 10);
    }

    #[test]
    fn test_growing_delay_caps_at_max() {
        let policy = ReconnectPolicy {
            delay_ms: 1000,
            max_delay_ms: 5000,
            multiplier: 10.0,
            jitter_factor: 0.0,
        };
        let mut backoff = ReconnectBackoff::new(policy);

        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ReconnectPolicy {
            delay_ms: 1000,
            max_delay_ms: 1000,
            multiplier: 1.0,
            jitter_factor: 0.1,
        };
        let mut backoff = ReconnectBackoff::new(policy);

        for _ in 0..20 {
            let delay = backoff.next_delay().as_millis();
            assert!((900..=1100).contains(&delay));
        }
    }

    #[test]
    fn test_reset() {
        let policy = ReconnectPolicy {
            delay_ms: 100,
            max_delay_ms: 10000,
            multiplier: 2.0,
            jitter_factor: 0.0,
        };
        let mut backoff = ReconnectBackoff::new(policy);

        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_delay_disables() {
        assert!(!ReconnectPolicy::disabled().is_enabled());
        assert!(ReconnectPolicy::default().is_enabled());
    }

    #[test]
    fn test_from_config() {
        let config = StompConfig {
            reconnect_delay_ms: 2000,
            reconnect_max_delay_ms: 100,
            reconnect_multiplier: 0.5,
            reconnect_jitter: 3.0,
            ..Default::default()
        };
        let policy = ReconnectPolicy::from_config(&config);

        assert_eq!(policy.delay_ms, 2000);
        assert_eq!(policy.max_delay_ms, 2000);
        assert_eq!(policy.multiplier, 1.0);
        assert_eq!(policy.jitter_factor, 1.0);
    }

    #[test]
    fn test_from_config_zero_delay_disables() {
        let config = StompConfig {
            reconnect_delay_ms: 0,
            reconnect_multiplier: 2.0,
            reconnect_jitter: 0.5,
            ..Default::default()
        };
        let policy = ReconnectPolicy::from_config(&config);

        assert!(!policy.is_enabled());
        assert_eq!(policy.multiplier, 1.0);
        assert_eq!(policy.jitter_factor, 0.0);
    }
}
