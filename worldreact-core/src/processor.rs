//! Seams between the engine and the outside world.
//!
//! - [`ReactionProcessor`] computes one authoritative reaction. It is
//!   expected to be slow (hundreds of milliseconds to seconds) and
//!   occasionally unavailable; the engine never trusts it to return in time.
//! - [`FallbackSynthesizer`] produces a substitute when the processor times
//!   out or fails. It must be cheap and must never call the processor.

use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FallbackReason, ReactionRequest, ReactionResult};

/// Computes one entity's reaction to a player action.
#[async_trait]
pub trait ReactionProcessor: Send + Sync {
    /// Compute the reaction for `request`.
    ///
    /// Errors are recovered by the runner and turned into fallback results.
    async fn process(&self, request: &ReactionRequest) -> Result<ReactionResult>;
}

/// Adapter turning an async closure into a [`ReactionProcessor`].
///
/// ```rust
/// # use worldreact_core::processor::FnProcessor;
/// # use worldreact_core::processor::ReactionProcessor;
/// # use worldreact_core::types::{ReactionData, ReactionRequest, ReactionResult};
/// let processor = FnProcessor::new(|request: ReactionRequest| async move {
///     Ok::<_, worldreact_core::ReactError>(ReactionResult::success(
///         request.target_entity,
///         ReactionData::default(),
///     ))
/// });
/// let _dyn: &dyn ReactionProcessor = &processor;
/// ```
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F> {
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ReactionProcessor for FnProcessor<F>
where
    F: Fn(ReactionRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ReactionResult>> + Send,
{
    async fn process(&self, request: &ReactionRequest) -> Result<ReactionResult> {
        (self.f)(request.clone()).await
    }
}

/// Produces a substitute reaction without calling the processor.
pub trait FallbackSynthesizer: Send + Sync {
    /// Build a fallback for `request` failing with `reason`.
    fn synthesize(&self, request: &ReactionRequest, reason: FallbackReason) -> ReactionResult;
}

/// Generic, low-commitment fallback narration.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFallback;

impl FallbackSynthesizer for GenericFallback {
    fn synthesize(&self, request: &ReactionRequest, reason: FallbackReason) -> ReactionResult {
        ReactionResult::generic_fallback(request.target_entity.clone(), reason)
    }
}
