//! Retry with backoff for transient backend failures.
//!
//! ```toml
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//! strategy = "exponential"
//! max_delay_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay between each retry
    Constant,
    /// base * attempt
    Linear,
    /// base * 2^(attempt - 1)
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Upper bound on any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            strategy: BackoffStrategy::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Result of an operation run under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub result: Result<T, BackendError>,
    pub retries: u32,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retries without sleeping; used where backoff timing is irrelevant.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            strategy: BackoffStrategy::Constant,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let delay_ms = match self.strategy {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base * attempt as f64,
            BackoffStrategy::Exponential => base * 2.0_f64.powi(attempt.saturating_sub(1) as i32),
        };

        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    /// Runs `operation`, retrying transient failures with backoff.
    ///
    /// Permanent failures return immediately. The last error is returned once
    /// retries are exhausted.
    pub fn run<T, F>(&self, label: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Result<T, BackendError>,
    {
        let mut retries = 0;
        loop {
            match operation() {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{} succeeded after {} retries", label, retries);
                    }
                    return Attempted {
                        result: Ok(value),
                        retries,
                    };
                }
                Err(err) if err.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.delay_for_attempt(retries);
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        label, err, retries, self.max_retries, delay
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(err) => {
                    return Attempted {
                        result: Err(err),
                        retries,
                    };
                }
            }
        }
    }
}
