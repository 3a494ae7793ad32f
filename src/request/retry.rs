//! Exponential backoff schedules for transient send failures.
//!
//! The execution loop retries from an explicit list of delays (see
//! [`Request::try_at`](crate::Request::try_at)). [`RetryPolicy`] generates
//! such a list with exponential growth, a cap and random jitter.
//!
//! # Example
//!
//! ```
//! use fetchbind::RetryPolicy;
//!
//! let delays = RetryPolicy::default().delays();
//! assert_eq!(delays.len(), 2); // 3 attempts = 2 retries
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

/// Default maximum attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// No single wait grows beyond this, jitter aside.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Upper bound of the random jitter added to every delay, in milliseconds.
const MAX_JITTER_MS: u64 = 500;

/// Generates the `try_at` schedule for a request.
///
/// The schedule has `max_attempts - 1` entries. Entry `n` (0-based) waits
/// `base_delay * backoff_multiplier^n`, capped at `max_delay`, plus up to
/// half a second of jitter so clients retrying together spread out. With
/// the defaults a request is tried 3 times, about 1 s and then 2 s apart.
///
/// ```
/// use fetchbind::{Context, Request, RetryPolicy};
///
/// let request = Request::new(Context::background())
///     .url("https://example.com")
///     .retry_policy(&RetryPolicy::with_max_attempts(5));
/// # let _ = request;
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Builds a policy. `max_attempts` counts the first try and is at
    /// least 1; a multiplier that would overflow the delay pins it at
    /// `max_delay`.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Default timing with a different attempt count.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Builds the delay schedule: one entry per retry, so
    /// `max_attempts - 1` entries.
    #[must_use]
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn delays(&self) -> Vec<Duration> {
        let mut rng = rand::thread_rng();
        let delays: Vec<Duration> = self
            .backoff()
            .map(|step| step + jitter(&mut rng))
            .collect();
        debug!(?delays, "retry schedule");
        delays
    }

    /// The capped exponential steps, without jitter.
    fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        let factor = f64::from(self.backoff_multiplier);
        let mut step = self.base_delay.min(self.max_delay);
        (1..self.max_attempts).map(move |_| {
            let current = step;
            step = Duration::try_from_secs_f64(step.as_secs_f64() * factor)
                .map_or(self.max_delay, |next| next.min(self.max_delay));
            current
        })
    }
}

fn jitter(rng: &mut impl Rng) -> Duration {
    Duration::from_millis(rng.gen_range(0..=MAX_JITTER_MS))
}
