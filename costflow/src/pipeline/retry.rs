//! Retrying executor with exponential backoff.
//!
//! The executor is the only retry mechanism in costflow: stages never loop
//! on their own. Failures are classified as retryable or fatal; retryable
//! failures wait `base_delay * 2^(attempt-1)` (capped at `max_delay`) before
//! the next attempt.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::{CostflowError, RetryError, RetryStop};

/// Jitter strategy applied on top of the exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Pure exponential backoff.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Try again after a delay.
    Retryable,
    /// Stop immediately.
    Fatal,
}

/// Default classifier: only transient external errors are retryable.
#[must_use]
pub fn classify_error(error: &CostflowError) -> ErrorClass {
    if error.is_transient() {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Delay to wait after the given (1-indexed) failed attempt, before jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Delay to wait after the given failed attempt, jitter applied.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.backoff_delay(attempt))
    }
}

/// A successful result and the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// The operation's value.
    pub value: T,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Runs an operation with bounded retry and exponential backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryingExecutor {
    config: RetryConfig,
}

impl RetryingExecutor {
    /// Creates an executor from a config.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Creates an executor from the three scalar knobs.
    #[must_use]
    pub fn with_policy(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(
            RetryConfig::new()
                .with_max_attempts(max_attempts)
                .with_base_delay(base_delay),
        )
    }

    /// Returns the config.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes `operation` with the default classifier.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CostflowError>>,
    {
        self.execute_classified(operation_name, operation, classify_error)
            .await
    }

    /// Executes `operation`, consulting `classify` on each failure.
    pub async fn execute_classified<T, F, Fut, C>(
        &self,
        operation_name: &str,
        mut operation: F,
        classify: C,
    ) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CostflowError>>,
        C: Fn(&CostflowError) -> ErrorClass,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) => error,
            };

            if classify(&error) == ErrorClass::Fatal {
                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "Fatal error, not retrying"
                );
                return Err(RetryError::new(operation_name, attempt, RetryStop::Fatal, error));
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "Retry budget exhausted"
                );
                return Err(RetryError::new(
                    operation_name,
                    attempt,
                    RetryStop::Exhausted,
                    error,
                ));
            }

            let delay = self.config.delay_for_attempt(attempt);
            tracing::warn!(
                operation = operation_name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
