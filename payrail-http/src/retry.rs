//! Backoff/jitter execution of the declarative retry policy.
//!
//! The policy itself is data ([`RetryConfig`]); this module decides whether a
//! failure class is retryable and how long to wait before the next attempt.
//! Backoff is exponential from `initial_backoff`, with uniform random jitter
//! bounded by `max_jitter`. Decode failures and 4xx responses are never
//! retried.

use std::time::Duration;

use payrail::config::RetryConfig;
use rand::Rng;

use crate::error::ApiError;

/// Returns `true` when `error` is retryable under `policy` and another
/// attempt remains.
#[must_use]
pub fn should_retry(policy: &RetryConfig, error: &ApiError, attempt: u32) -> bool {
    if !policy.enabled || attempt >= policy.max_retries {
        return false;
    }
    if error.is_transport() {
        return policy.retry_network_errors;
    }
    if error.is_server_error() {
        return policy.retry_500_errors;
    }
    false
}

/// Computes the delay before retry number `attempt` (zero-based).
#[must_use]
pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> Duration {
    let base = policy
        .initial_backoff
        .saturating_mul(2_u32.saturating_pow(attempt));
    let jitter_cap = policy.max_jitter.as_secs_f64();
    let jitter = if jitter_cap > 0.0 {
        Duration::from_secs_f64(rand::rng().random_range(0.0..=jitter_cap))
    } else {
        Duration::ZERO
    };
    base + jitter
}
