//! Session Restart Policy
//!
//! Exponential backoff with jitter between streaming sessions. The core never
//! reconnects inside a session; the supervisor consults this policy after a
//! session ends with an error.

use std::time::Duration;

use rand::Rng;

/// Backoff settings.
#[derive(Debug, Clone)]
pub struct RestartConfig {
    /// Whether failed sessions are restarted at all.
    pub enabled: bool,
    /// Delay before the first restart.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each restart.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum consecutive restarts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

impl RestartConfig {
    /// Configuration that never restarts.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Tracks consecutive restarts and computes the next delay.
#[derive(Debug)]
pub struct RestartPolicy {
    config: RestartConfig,
    next_base: Duration,
    attempts: u32,
}

impl RestartPolicy {
    /// Create a policy at its initial delay.
    #[must_use]
    pub fn new(config: RestartConfig) -> Self {
        let next_base = config.initial_delay.min(config.max_delay);
        Self {
            config,
            next_base,
            attempts: 0,
        }
    }

    /// Delay before the next restart, or `None` when restarts are disabled or
    /// the attempt limit is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.config.enabled
            || (self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts)
        {
            return None;
        }
        self.attempts += 1;

        let delay = self.next_base;
        let grown = Duration::try_from_secs_f64(delay.as_secs_f64() * self.config.multiplier)
            .unwrap_or(self.config.max_delay);
        self.next_base = grown.min(self.config.max_delay);

        Some(jittered(delay, self.config.jitter_factor))
    }

    /// Forget past failures after a session streamed successfully.
    pub fn reset(&mut self) {
        self.next_base = self.config.initial_delay.min(self.config.max_delay);
        self.attempts = 0;
    }

    /// Consecutive restarts so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether restarts are enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.config.enabled
    }
}

fn jittered(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = delay.as_secs_f64() * factor;
    let offset = rand::rng().random_range(-spread..=spread);
    Duration::try_from_secs_f64((delay.as_secs_f64() + offset).max(0.001)).unwrap_or(delay)
}
