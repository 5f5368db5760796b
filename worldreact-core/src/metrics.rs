//! Runtime metrics for the reaction optimizer.
//!
//! Counters are lock-free `AtomicU64`s bumped on the hot path; the running
//! latency mean needs a consistent (count, mean) pair and sits behind a
//! `parking_lot::Mutex`. Metrics live as long as the optimizer that owns
//! them and are never reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Process-lifetime counters for one optimizer instance.
pub struct PerformanceMetrics {
    /// Entity assessments requested.
    pub total_requests: AtomicU64,
    /// Assessments that produced an authoritative result.
    pub successful_requests: AtomicU64,
    /// Assessments that ended in a fallback.
    pub failed_requests: AtomicU64,
    /// Assessments served from the cache.
    pub cache_hits: AtomicU64,
    /// Assessments that had to be computed.
    pub cache_misses: AtomicU64,
    /// Computations dispatched through the bounded runner.
    pub concurrent_operations: AtomicU64,
    /// Computations that hit their per-item timeout.
    pub timeouts: AtomicU64,
    /// Fallback results returned (timeouts included).
    pub fallbacks: AtomicU64,
    latency: Mutex<RunningMean>,
    last_log: Mutex<Option<Instant>>,
}

#[derive(Default)]
struct RunningMean {
    samples: u64,
    mean_secs: f64,
}

impl PerformanceMetrics {
    /// Create a new set of zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            concurrent_operations: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            latency: Mutex::new(RunningMean::default()),
            last_log: Mutex::new(None),
        }
    }

    /// Fold one call latency into the running mean (incremental mean).
    pub fn record_latency(&self, elapsed: Duration) {
        let mut latency = self.latency.lock();
        latency.samples += 1;
        let n = latency.samples as f64;
        latency.mean_secs += (elapsed.as_secs_f64() - latency.mean_secs) / n;
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Whether a periodic log line is due; marks it as emitted when it is.
    pub fn log_due(&self, interval: Duration) -> bool {
        let now = Instant::now();
        let mut last = self.last_log.lock();
        match *last {
            Some(at) if now.saturating_duration_since(at) < interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.latency.lock();
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            concurrent_operations: self.concurrent_operations.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            average_latency: Duration::from_secs_f64(latency.mean_secs.max(0.0)),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metric values at a point in time.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Entity assessments requested.
    pub total_requests: u64,
    /// Authoritative results.
    pub successful_requests: u64,
    /// Fallback results.
    pub failed_requests: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Computations dispatched concurrently.
    pub concurrent_operations: u64,
    /// Per-item timeouts.
    pub timeouts: u64,
    /// Fallback results returned.
    pub fallbacks: u64,
    /// Running mean of per-call latency.
    pub average_latency: Duration,
}

impl MetricsSnapshot {
    /// Fraction of lookups served from cache.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    /// Fraction of assessments that produced an authoritative result.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_requests, self.total_requests)
    }

    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP worldreact_requests_total Entity reaction assessments requested\n\
             # TYPE worldreact_requests_total counter\n\
             worldreact_requests_total {}\n\
             # HELP worldreact_requests_outcome_total Assessments by outcome\n\
             # TYPE worldreact_requests_outcome_total counter\n\
             worldreact_requests_outcome_total{{outcome=\"success\"}} {}\n\
             worldreact_requests_outcome_total{{outcome=\"fallback\"}} {}\n\
             # HELP worldreact_cache_lookups_total Cache lookups by result\n\
             # TYPE worldreact_cache_lookups_total counter\n\
             worldreact_cache_lookups_total{{result=\"hit\"}} {}\n\
             worldreact_cache_lookups_total{{result=\"miss\"}} {}\n\
             # HELP worldreact_concurrent_operations_total Computations dispatched concurrently\n\
             # TYPE worldreact_concurrent_operations_total counter\n\
             worldreact_concurrent_operations_total {}\n\
             # HELP worldreact_timeouts_total Computations that timed out\n\
             # TYPE worldreact_timeouts_total counter\n\
             worldreact_timeouts_total {}\n\
             # HELP worldreact_fallbacks_total Fallback results returned\n\
             # TYPE worldreact_fallbacks_total counter\n\
             worldreact_fallbacks_total {}\n\
             # HELP worldreact_latency_seconds_avg Running mean assessment latency\n\
             # TYPE worldreact_latency_seconds_avg gauge\n\
             worldreact_latency_seconds_avg {:.6}\n",
            self.total_requests,
            self.successful_requests,
            self.failed_requests,
            self.cache_hits,
            self.cache_misses,
            self.concurrent_operations,
            self.timeouts,
            self.fallbacks,
            self.average_latency.as_secs_f64(),
        )
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
