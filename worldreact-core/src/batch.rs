//! Batch grouper: accumulates requests and releases them as groups.
//!
//! Submitted requests go into an unbounded queue drained by a single
//! dispatcher task. A batch is released when either
//!
//! - `batch_size` requests are waiting, or
//! - `batch_timeout` has passed since the oldest waiting request arrived,
//!
//! whichever comes first. The batch is then split by [`BatchKey`]
//! (request mode × target kind) so structurally similar requests share
//! downstream setup, and each group goes to the [`BatchHandler`] on its own
//! task. At most `max_concurrent_batches` groups run at once; further
//! groups wait for a slot.
//!
//! Every submitted request resolves. A failing or panicking group resolves
//! each of its items with an error fallback, and a request submitted after
//! shutdown resolves immediately the same way.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BatchConfig;
use crate::error::{ReactError, Result};
use crate::types::{EntityKind, FallbackReason, ReactionRequest, ReactionResult, RequestMode};

/// Similarity key requests are grouped by before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    /// Submitting path.
    pub mode: RequestMode,
    /// Kind of the target entity.
    pub kind: EntityKind,
}

impl BatchKey {
    /// Key for `request`.
    #[must_use]
    pub fn of(request: &ReactionRequest) -> Self {
        Self {
            mode: request.mode,
            kind: request.target_kind(),
        }
    }
}

/// Processes one group of similar requests.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    /// Produce one result per request, in order.
    ///
    /// Returning `Err` (or fewer results than requests) resolves the
    /// affected items with error fallbacks.
    async fn process_group(
        &self,
        key: BatchKey,
        requests: Vec<ReactionRequest>,
    ) -> Result<Vec<ReactionResult>>;
}

/// Handle to a submitted request's eventual result.
pub struct PendingReaction {
    target_entity: String,
    rx: oneshot::Receiver<ReactionResult>,
}

impl PendingReaction {
    /// A handle already resolved with `result`.
    #[must_use]
    pub fn ready(result: ReactionResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let target_entity = result.target_entity.clone();
        let _ = tx.send(result);
        Self { target_entity, rx }
    }

    /// Wait for the result. Never fails: a dropped group yields an error fallback.
    pub async fn wait(self) -> ReactionResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => ReactionResult::generic_fallback(
                self.target_entity,
                FallbackReason::Error("batch dropped before completion".into()),
            ),
        }
    }
}

struct QueuedItem {
    request: ReactionRequest,
    tx: oneshot::Sender<ReactionResult>,
    enqueued_at: Instant,
}

/// Statistics about the batch grouper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Requests accepted.
    pub submitted: u64,
    /// Batches released by the dispatcher.
    pub batches_released: u64,
    /// Similarity groups handed to the handler.
    pub groups_dispatched: u64,
    /// Groups that failed and were resolved with fallbacks.
    pub groups_failed: u64,
}

#[derive(Default)]
struct BatchCounters {
    submitted: AtomicU64,
    batches_released: AtomicU64,
    groups_dispatched: AtomicU64,
    groups_failed: AtomicU64,
}

/// Accumulates requests and dispatches them in similarity groups.
pub struct BatchProcessor {
    tx: Option<mpsc::UnboundedSender<QueuedItem>>,
    dispatcher: Option<JoinHandle<()>>,
    counters: Arc<BatchCounters>,
}

impl BatchProcessor {
    /// Start the dispatcher on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `ReactError::Config` for a zero batch size or concurrency, and
    /// `ReactError::Integration` when called outside a tokio runtime.
    pub fn spawn(config: &BatchConfig, handler: Arc<dyn BatchHandler>) -> Result<Self> {
        if config.batch_size == 0 || config.max_concurrent_batches == 0 {
            return Err(ReactError::Config(
                "batch_size and max_concurrent_batches must be greater than zero".into(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ReactError::Integration(format!("batch grouper needs a tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(BatchCounters::default());
        let dispatcher = runtime.spawn(run_dispatcher(
            rx,
            handler,
            config.batch_size,
            config.batch_timeout(),
            Arc::new(Semaphore::new(config.max_concurrent_batches)),
            Arc::clone(&counters),
        ));

        Ok(Self {
            tx: Some(tx),
            dispatcher: Some(dispatcher),
            counters,
        })
    }

    /// Queue `request` for batched processing.
    pub fn submit(&self, request: ReactionRequest) -> PendingReaction {
        let (tx, rx) = oneshot::channel();
        let target_entity = request.target_entity.clone();
        let item = QueuedItem {
            request,
            tx,
            enqueued_at: Instant::now(),
        };

        match &self.tx {
            Some(queue) => {
                if let Err(mpsc::error::SendError(item)) = queue.send(item) {
                    reject(item, "batch grouper stopped");
                } else {
                    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => reject(item, "batch grouper stopped"),
        }

        PendingReaction { target_entity, rx }
    }

    /// Snapshot of dispatch counters.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        BatchStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            batches_released: self.counters.batches_released.load(Ordering::Relaxed),
            groups_dispatched: self.counters.groups_dispatched.load(Ordering::Relaxed),
            groups_failed: self.counters.groups_failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting requests, flush everything queued and wait for the
    /// dispatcher to hand off its last batch.
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                warn!(error = %e, "batch dispatcher ended abnormally");
            }
        }
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        // Closing the queue lets the dispatcher flush and exit on its own.
        self.tx.take();
    }
}

fn reject(item: QueuedItem, why: &str) {
    let result = ReactionResult::generic_fallback(
        item.request.target_entity.clone(),
        FallbackReason::Error(why.to_string()),
    );
    // The receiver may already be gone; nothing else to do then.
    let _ = item.tx.send(result);
}

async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<QueuedItem>,
    handler: Arc<dyn BatchHandler>,
    batch_size: usize,
    batch_timeout: Duration,
    slots: Arc<Semaphore>,
    counters: Arc<BatchCounters>,
) {
    let mut groups = Vec::new();

    while let Some(first) = rx.recv().await {
        // The batch timeout runs from submission, not from when the
        // dispatcher got around to the item.
        let deadline = first.enqueued_at + batch_timeout;
        let mut batch = vec![first];

        while batch.len() < batch_size {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => batch.push(item),
                    None => break,
                },
                () = tokio::time::sleep_until(deadline) => break,
            }
        }

        counters.batches_released.fetch_add(1, Ordering::Relaxed);
        debug!(size = batch.len(), "releasing batch");

        for (key, items) in group_by_key(batch) {
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                for item in items {
                    reject(item, "batch slots closed");
                }
                continue;
            };
            counters.groups_dispatched.fetch_add(1, Ordering::Relaxed);
            let handler = Arc::clone(&handler);
            let counters = Arc::clone(&counters);
            groups.push(tokio::spawn(async move {
                let _permit = permit;
                process_group(handler, key, items, &counters).await;
            }));
        }
        groups.retain(|g: &JoinHandle<()>| !g.is_finished());
    }

    // Queue closed: let in-flight groups finish before reporting done.
    for group in groups {
        if let Err(e) = group.await {
            warn!(error = %e, "batch group task ended abnormally");
        }
    }
}

/// Split a batch by similarity key, keeping first-seen key order.
fn group_by_key(batch: Vec<QueuedItem>) -> Vec<(BatchKey, Vec<QueuedItem>)> {
    let mut order: Vec<BatchKey> = Vec::new();
    let mut groups: HashMap<BatchKey, Vec<QueuedItem>> = HashMap::new();
    for item in batch {
        let key = BatchKey::of(&item.request);
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(item);
    }
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key).map(|items| (key, items)))
        .collect()
}

async fn process_group(
    handler: Arc<dyn BatchHandler>,
    key: BatchKey,
    items: Vec<QueuedItem>,
    counters: &BatchCounters,
) {
    let requests: Vec<ReactionRequest> = items.iter().map(|i| i.request.clone()).collect();
    // Run the handler on its own task so a panic is observed here instead of
    // silently dropping every sender in the group.
    let outcome = tokio::spawn(async move { handler.process_group(key, requests).await }).await;

    let results = match outcome {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            warn!(?key, error = %e, "batch group failed");
            counters.groups_failed.fetch_add(1, Ordering::Relaxed);
            fail_all(items, &e.to_string());
            return;
        }
        Err(e) => {
            warn!(?key, error = %e, "batch group task aborted");
            counters.groups_failed.fetch_add(1, Ordering::Relaxed);
            fail_all(items, &format!("group task failed: {e}"));
            return;
        }
    };

    let mut results = results.into_iter();
    for item in items {
        match results.next() {
            Some(result) => {
                let _ = item.tx.send(result);
            }
            None => reject(item, "batch handler returned too few results"),
        }
    }
}

fn fail_all(items: Vec<QueuedItem>, why: &str) {
    for item in items {
        reject(item, why);
    }
}
