//! Timeout race, bounded retry with exponential backoff, and the
//! [`RetryController`] that turns exhaustion into a fallback response.
//!
//! ```text
//! precheck ──Err──────────────────────────────▶ fallback   (no attempt used)
//!    │ Ok
//!    ▼
//! attempt n ──Ok(non-empty)──▶ GenerationResult
//!    │ Err / timeout / empty
//!    ├─ n < max ──sleep(unit × 2^n)──▶ attempt n+1
//!    └─ n = max ─────────────────────▶ fallback
//! ```
//!
//! A unit of work receives a child [`CancellationToken`]; on deadline the
//! token is cancelled and the attempt counts as failed even if the
//! underlying request is still in flight.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::llm::client::LlmError;
use crate::llm::fallback::FallbackSynthesizer;
use crate::types::{GenerationResult, InputKind};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Backoff after failed attempt `n` is `backoff_unit × 2^n`.
    pub backoff_unit: Duration,
    /// Deadline for one attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        }
    }

    /// Wait after failed attempt `attempt` (1-based): 2, 4, 8 … units.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why [`call_with_policy`] gave up.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("all {attempts} attempts failed; last error: {last}")]
    Exhausted { attempts: u32, last: LlmError },

    #[error("cancelled")]
    Cancelled,
}

/// The owning run was cancelled; any result is to be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Race one unit of work against `timeout` and the run's `cancel` token.
///
/// The work gets a child token which is cancelled when the deadline passes.
pub async fn with_deadline<T, F, Fut>(
    cancel: &CancellationToken,
    timeout: Duration,
    work: F,
) -> Result<T, LlmError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    if cancel.is_cancelled() {
        return Err(LlmError::Cancelled);
    }
    let token = cancel.child_token();
    let fut = work(token.clone());

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        result = fut => result,
        _ = tokio::time::sleep(timeout) => {
            token.cancel();
            Err(LlmError::Timeout)
        }
    }
}

/// Run `work` under `policy`: each attempt raced against the per-attempt
/// deadline, failed attempts followed by exponential backoff.
pub async fn call_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut work: F,
) -> Result<T, RetryError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last = LlmError::EmptyResponse;

    for attempt in 1..=policy.max_attempts {
        match with_deadline(cancel, policy.attempt_timeout, &mut work).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("retry: succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(LlmError::Cancelled) => return Err(RetryError::Cancelled),
            Err(e) => {
                log::warn!(
                    "retry: attempt {attempt}/{} failed: {e}",
                    policy.max_attempts
                );
                last = e;
            }
        }

        if attempt < policy.max_attempts {
            let wait = policy.backoff(attempt);
            log::debug!("retry: backing off {wait:?}");
            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
        last,
    })
}

// ---------------------------------------------------------------------------
// RetryController
// ---------------------------------------------------------------------------

/// Applies a [`RetryPolicy`] to a text-producing unit of work and guarantees
/// a non-empty [`GenerationResult`]: exhaustion and validation failures both
/// end in the [`FallbackSynthesizer`].
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
    fallback: FallbackSynthesizer,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            fallback: FallbackSynthesizer::new(),
        }
    }

    pub fn fallback(&self) -> &FallbackSynthesizer {
        &self.fallback
    }

    /// Run `work` for an input of `kind`.
    ///
    /// `precheck` is the up-front validation verdict; an `Err` goes straight
    /// to the fallback without using an attempt.  Empty output counts as a
    /// failed attempt.  Only cancellation escapes as an error.
    pub async fn run<F, Fut>(
        &self,
        kind: InputKind,
        precheck: Result<(), String>,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<GenerationResult, Cancelled>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
    {
        if let Err(message) = precheck {
            return Ok(self.fallback.synthesize(kind, &message));
        }

        let outcome = call_with_policy(&self.policy, cancel, |token| {
            let fut = work(token);
            async move {
                let text = fut.await?;
                if text.trim().is_empty() {
                    return Err(LlmError::EmptyResponse);
                }
                Ok(text)
            }
        })
        .await;

        match outcome {
            Ok(text) => Ok(GenerationResult::now(text)),
            Err(RetryError::Cancelled) => Err(Cancelled),
            Err(e @ RetryError::Exhausted { .. }) => {
                Ok(self.fallback.synthesize(kind, &e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
