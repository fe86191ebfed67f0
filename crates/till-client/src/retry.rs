//! # Retry With Linear Backoff
//!
//! Wraps a remote call so transient failures are retried a bounded number
//! of times.
//!
//! ## Schedule (max_retries = 2, base = 500ms)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  attempt 1 ──✗──► wait 500ms ──► attempt 2 ──✗──► wait 1000ms ──►      │
//! │  attempt 3 ──✗──► give up, surface the last error                      │
//! │                                                                         │
//! │  Any success returns immediately. A permanent error (4xx, decode,      │
//! │  validation) is surfaced on the attempt that produced it.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotency
//! Whether a call may be retried at all is part of its type. Reads use
//! [`Idempotent`]; submissions use [`NonIdempotent`], which always makes
//! exactly one attempt so a movement can never be recorded twice.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use tracing::{debug, error, warn};

// =============================================================================
// Retry Classification
// =============================================================================

/// Errors that know whether repeating the call could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Idempotent {}
    impl Sealed for super::NonIdempotent {}
}

/// Marks a call as safe or unsafe to repeat.
pub trait CallKind: sealed::Sealed {
    /// Whether the retry loop may attempt the call more than once.
    const RETRIES: bool;
    const NAME: &'static str;
}

/// Calls with no side effects on the backend (reads).
#[derive(Debug, Clone, Copy, Default)]
pub struct Idempotent;

/// Calls that create state on the backend (movement submission, open/close).
#[derive(Debug, Clone, Copy, Default)]
pub struct NonIdempotent;

impl CallKind for Idempotent {
    const RETRIES: bool = true;
    const NAME: &'static str = "idempotent";
}

impl CallKind for NonIdempotent {
    const RETRIES: bool = false;
    const NAME: &'static str = "non_idempotent";
}

// =============================================================================
// Linear Backoff
// =============================================================================

/// Backoff whose `n`th delay (1-based) is `base * n`, ending after
/// `max_retries` delays.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    max_retries: u32,
    issued: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        LinearBackoff {
            base,
            max_retries,
            issued: 0,
        }
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.issued >= self.max_retries {
            return None;
        }
        self.issued += 1;
        Some(self.base.checked_mul(self.issued).unwrap_or(Duration::MAX))
    }

    fn reset(&mut self) {
        self.issued = 0;
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        RetryPolicy {
            max_retries,
            backoff_base,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Upper bound on attempts for an idempotent call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// A fresh backoff for one call.
    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.backoff_base, self.max_retries)
    }
}

// =============================================================================
// Retry Loop
// =============================================================================

/// Runs `op` under `policy`.
///
/// Each invocation owns its backoff, so concurrent calls never share
/// attempt counters. `label` names the call in log output.
pub async fn retry<K, T, E, F, Fut>(
    _kind: K,
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    K: CallKind,
    E: Retryable + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = if K::RETRIES {
        policy.backoff()
    } else {
        RetryPolicy::none().backoff()
    };
    let mut attempt = 1u32;

    loop {
        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(call = label, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(call = label, attempt, error = %err, "Permanent failure, not retrying");
            return Err(err);
        }

        match backoff.next_backoff() {
            Some(delay) => {
                warn!(
                    call = label,
                    kind = K::NAME,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => {
                if K::RETRIES && policy.max_retries > 0 {
                    error!(call = label, attempts = attempt, error = %err, "Retries exhausted");
                }
                return Err(err);
            }
        }
    }
}
