//! Retry policy, backoff and the injectable wait primitives.

use crate::pipeline::CancellationToken;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Granularity of cancellation checks while sleeping.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Exponential backoff parameters for the model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of send attempts, including the first one.
    /// Default: 3
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    /// Default: 1000
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay in milliseconds.
    /// Default: 30000
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive delays.
    /// Default: 2.0
    pub multiplier: f64,

    /// Relative jitter applied to each delay (0.2 = +/-20%).
    /// Default: 0.2
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn check(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("multiplier {} must be >= 1.0", self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter {} must be between 0.0 and 1.0", self.jitter));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("initial_backoff_ms must not exceed max_backoff_ms".to_string());
        }
        Ok(())
    }

    /// Delay before the retry that follows the `failed_attempts`-th failure.
    ///
    /// `initial * multiplier^(failed_attempts - 1)`, capped at the maximum,
    /// then scaled by `1 + jitter * sample` where the sample is in `[-1, 1]`.
    pub fn backoff(&self, failed_attempts: u32, jitter: &dyn JitterSource) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(63) as i32;
        let base = (self.initial_backoff_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);
        let sample = jitter.sample().clamp(-1.0, 1.0);
        let delay = (base * (1.0 + self.jitter * sample)).max(0.0);
        Duration::from_millis(delay.round() as u64)
    }
}

/// Waits between attempts.
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration` unless the token is cancelled first.
    ///
    /// Returns `false` if the wait was cut short by cancellation.
    fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool;
}

/// Sleeps on the current thread, waking early on cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if token.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Source of jitter samples in `[-1, 1]`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Jitter from a `rand` generator.
#[derive(Debug)]
pub struct RandJitter {
    rng: Mutex<StdRng>,
}

impl RandJitter {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterSource for RandJitter {
    fn sample(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(-1.0..=1.0),
            Err(_) => 0.0,
        }
    }
}

/// No jitter at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&self) -> f64 {
        0.0
    }
}
