//! Retry Executor - Backoff + Error Classification
//!
//! Runs an async operation under a [`RetryPolicy`]. Retryable failures are
//! retried with exponential backoff until the attempt budget is spent;
//! non-retryable failures surface immediately, without sleeping.
//!
//! The executor never deduplicates or caches. Whatever it wraps must be safe
//! to run more than once.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

// ============================================
// ERROR PLUMBING
// ============================================

/// Errors that can represent an attempt which ran out of time.
///
/// The executor uses this to turn an elapsed per-attempt timeout into the
/// caller's own error type, so the classifier sees it like any other failure.
pub trait AttemptTimeout {
    fn attempt_timed_out(operation: &str, after: Duration) -> Self;
}

/// Invalid policy parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryPolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("max_delay ({max:?}) is shorter than initial_delay ({initial:?})")]
    DelayRange { initial: Duration, max: Duration },

    #[error("backoff_multiplier must be > 1 (got {0})")]
    Multiplier(f64),
}

// ============================================
// POLICY
// ============================================

/// How often, how patiently and for which errors to retry
pub struct RetryPolicy<E> {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Sleep before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single sleep
    pub max_delay: Duration,

    /// Growth factor applied to the delay after each retry
    pub backoff_multiplier: f64,

    /// Optional wall-clock limit per attempt
    pub attempt_timeout: Option<Duration>,

    /// Returns true when an error is worth another attempt
    pub classifier: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            attempt_timeout: self.attempt_timeout,
            classifier: self.classifier,
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    pub fn new(max_attempts: u32, classifier: fn(&E) -> bool) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            attempt_timeout: None,
            classifier,
        }
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Same policy with zero sleeps (tests, local nodes)
    pub fn without_backoff(self) -> Self {
        self.with_delays(Duration::ZERO, Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.max_attempts == 0 {
            return Err(RetryPolicyError::NoAttempts);
        }
        if self.max_delay < self.initial_delay {
            return Err(RetryPolicyError::DelayRange {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        if !(self.backoff_multiplier > 1.0) {
            return Err(RetryPolicyError::Multiplier(self.backoff_multiplier));
        }
        Ok(())
    }

    /// Next sleep after `delay`, capped at `max_delay`
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .map(|next| next.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

/// Callback invoked before each retry sleep: (failed attempt, error, upcoming delay)
pub type RetryObserver<E> = Arc<dyn Fn(u32, &E, Duration) + Send + Sync>;

// ============================================
// EXECUTOR
// ============================================

pub struct RetryExecutor<E> {
    policy: RetryPolicy<E>,
    observer: Option<RetryObserver<E>>,
}

impl<E> RetryExecutor<E>
where
    E: Display + AttemptTimeout,
{
    /// Rejects a policy that could never run or never back off
    pub fn new(policy: RetryPolicy<E>) -> Result<Self, RetryPolicyError> {
        policy.validate()?;
        Ok(Self {
            policy,
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: RetryObserver<E>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` only labels log lines and timeout errors.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut delay = self.policy.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome = match self.policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(E::attempt_timed_out(operation, limit)),
                },
                None => op().await,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts || !(self.policy.classifier)(&err) {
                return Err(err);
            }

            warn!(
                "{} failed (attempt {}/{}): {} - retrying in {:?}",
                operation, attempt, max_attempts, err, delay
            );

            if let Some(observer) = &self.observer {
                observer(attempt, &err, delay);
            }

            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
        }
    }
}

// ============================================
// TESTS
// ============================================
