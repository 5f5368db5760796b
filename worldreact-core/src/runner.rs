//! Bounded concurrency runner.
//!
//! Runs a batch of reaction computations with at most `max_concurrent` in
//! flight (a counting semaphore, shared by every call on this runner) and a
//! per-item timeout. Each item ends in exactly one of three ways:
//!
//! 1. completed → the processor's result,
//! 2. timed out → a `FallbackReason::Timeout` fallback,
//! 3. failed (error or panic) → a `FallbackReason::Error` fallback.
//!
//! Nothing escapes [`ConcurrencyRunner::run_all`]: it returns one result per
//! input, in input order, whatever order the computations finish in.
//!
//! The timeout clock starts once an item holds a permit, so time spent
//! queueing behind the concurrency cap does not count against it. Expiry
//! cancels that one computation only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ReactError, Result};
use crate::processor::{FallbackSynthesizer, ReactionProcessor};
use crate::types::{FallbackReason, ReactionRequest, ReactionResult};

/// Executes reaction computations under a concurrency cap and per-item timeout.
pub struct ConcurrencyRunner {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    timeout_us: AtomicU64,
    max_timeout: Duration,
    fallback: Arc<dyn FallbackSynthesizer>,
}

impl ConcurrencyRunner {
    /// Create a runner.
    ///
    /// # Errors
    /// Returns `ReactError::Config` for a zero concurrency cap or a timeout
    /// that is zero or above `max_timeout`.
    pub fn new(
        max_concurrent: usize,
        timeout: Duration,
        max_timeout: Duration,
        fallback: Arc<dyn FallbackSynthesizer>,
    ) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(ReactError::Config("max_concurrent must be greater than zero".into()));
        }
        validate_timeout(timeout, max_timeout)?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout_us: AtomicU64::new(duration_to_us(timeout)),
            max_timeout,
            fallback,
        })
    }

    /// Current per-item timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.timeout_us.load(Ordering::Relaxed))
    }

    /// Change the per-item timeout for subsequent calls.
    ///
    /// # Errors
    /// Returns `ReactError::Config` if `timeout` is zero or exceeds the ceiling;
    /// the previous timeout stays in effect.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        validate_timeout(timeout, self.max_timeout)?;
        self.timeout_us.store(duration_to_us(timeout), Ordering::Relaxed);
        Ok(())
    }

    /// Concurrency cap.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Computations currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// The synthesizer used for timeout and error fallbacks.
    #[must_use]
    pub fn fallback(&self) -> &Arc<dyn FallbackSynthesizer> {
        &self.fallback
    }

    /// Run every request with the current timeout.
    pub async fn run_all(
        &self,
        items: Vec<ReactionRequest>,
        processor: Arc<dyn ReactionProcessor>,
    ) -> Vec<ReactionResult> {
        self.run_all_with_timeout(items, processor, self.timeout()).await
    }

    /// Run every request with an explicit per-item timeout for this call only.
    ///
    /// The runner's configured timeout is left untouched, so callers that need
    /// a tighter bound never have to restore anything.
    pub async fn run_all_with_timeout(
        &self,
        items: Vec<ReactionRequest>,
        processor: Arc<dyn ReactionProcessor>,
        timeout: Duration,
    ) -> Vec<ReactionResult> {
        if items.is_empty() {
            return Vec::new();
        }
        debug!(items = items.len(), ?timeout, "dispatching reaction computations");

        let mut tasks = AbortOnDrop(
            items
                .iter()
                .cloned()
                .map(|request| {
                    tokio::spawn(run_one(
                        request,
                        Arc::clone(&processor),
                        Arc::clone(&self.fallback),
                        Arc::clone(&self.semaphore),
                        timeout,
                    ))
                })
                .collect(),
        );

        let mut results = Vec::with_capacity(items.len());
        for (request, handle) in items.iter().zip(tasks.0.iter_mut()) {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(entity = %request.target_entity, error = %err, "reaction task aborted");
                    self.fallback
                        .synthesize(request, FallbackReason::Error(format!("task failed: {err}")))
                }
            };
            results.push(result);
        }
        results
    }
}

async fn run_one(
    request: ReactionRequest,
    processor: Arc<dyn ReactionProcessor>,
    fallback: Arc<dyn FallbackSynthesizer>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
) -> ReactionResult {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return fallback.synthesize(&request, FallbackReason::Error("runner closed".into()));
    };

    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, processor.process(&request)).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(result)) => result.with_assessment_time(elapsed),
        Ok(Err(ReactError::Timeout(after))) => {
            warn!(entity = %request.target_entity, ?after, "reaction computation reported a timeout");
            fallback
                .synthesize(&request, FallbackReason::Timeout)
                .with_assessment_time(elapsed)
        }
        Ok(Err(err)) => {
            warn!(entity = %request.target_entity, error = %err, "reaction computation failed");
            fallback
                .synthesize(&request, FallbackReason::Error(err.to_string()))
                .with_assessment_time(elapsed)
        }
        Err(_) => {
            warn!(entity = %request.target_entity, ?timeout, "reaction computation timed out");
            fallback
                .synthesize(&request, FallbackReason::Timeout)
                .with_assessment_time(elapsed)
        }
    }
}

/// Aborts still-running tasks if the caller stops waiting for them.
struct AbortOnDrop(Vec<JoinHandle<ReactionResult>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn validate_timeout(timeout: Duration, max_timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(ReactError::Config("reaction timeout must be greater than zero".into()));
    }
    if timeout > max_timeout {
        return Err(ReactError::Config(format!(
            "reaction timeout {timeout:?} exceeds the {max_timeout:?} ceiling"
        )));
    }
    Ok(())
}

fn duration_to_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
