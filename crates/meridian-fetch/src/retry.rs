use std::time::Duration;

use rand::Rng;

/// Backoff schedule for transient download failures: 5s, 10s, 20s, ...
/// capped at 90s, with jitter so concurrent items do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    RetryPolicy {
      max_retries: 3,
      base_delay: Duration::from_secs(5),
      max_delay: Duration::from_secs(90),
    }
  }
}

impl RetryPolicy {
  pub fn with_max_retries(max_retries: u32) -> Self {
    RetryPolicy {
      max_retries,
      ..Default::default()
    }
  }

  /// Delay before retry number `attempt` (zero-based), jittered by ±25%.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
    let capped = exponential.min(self.max_delay.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_secs_f64(capped * jitter)
  }
}
