//! Request metrics ledger
//!
//! Monotonic counters for totals plus a sliding window of per-attempt
//! samples. Counters are lock-free atomics; the window and cumulative
//! durations sit behind a short mutex. The pipeline writes on every
//! attempt; the governor's control loop reads `window_stats` when revising
//! its permit count.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Samples older than this never influence the governor.
const WINDOW_RETENTION: Duration = Duration::from_secs(300);

/// Hard cap on buffered samples, bounding memory under sustained load.
const WINDOW_CAPACITY: usize = 4096;

#[derive(Debug)]
struct Sample {
    at: Instant,
    latency: Duration,
    rate_limited: bool,
    retry: bool,
}

#[derive(Debug, Default)]
struct Aggregates {
    response_time: Duration,
    token_wait: Duration,
    window: VecDeque<Sample>,
}

/// Process-local metrics for one client.
#[derive(Debug, Default)]
pub struct MetricsLedger {
    total_requests: AtomicU64,
    total_retries: AtomicU64,
    total_rate_limit_errors: AtomicU64,
    aggregates: Mutex<Aggregates>,
}

/// Point-in-time copy of the counters and cumulative durations.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_retries: u64,
    pub total_rate_limit_errors: u64,
    pub cumulative_response_time: Duration,
    pub cumulative_token_wait: Duration,
}

/// Aggregate over the sliding window, consumed by the adaptive controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub samples: usize,
    pub avg_latency: Duration,
    pub rate_limit_ratio: f64,
    pub retries_per_request: f64,
}

impl WindowStats {
    fn empty() -> Self {
        Self {
            samples: 0,
            avg_latency: Duration::ZERO,
            rate_limit_ratio: 0.0,
            retries_per_request: 0.0,
        }
    }
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched attempt. `retry` marks attempts after the
    /// first of a logical call.
    pub fn record_attempt(&self, latency: Duration, rate_limited: bool, retry: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut agg = self.aggregates.lock().unwrap();
        agg.response_time += latency;
        agg.window.push_back(Sample {
            at: Instant::now(),
            latency,
            rate_limited,
            retry,
        });
        while agg.window.len() > WINDOW_CAPACITY {
            agg.window.pop_front();
        }
    }

    pub fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit(&self) {
        self.total_rate_limit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_token_wait(&self, waited: Duration) {
        let mut agg = self.aggregates.lock().unwrap();
        agg.token_wait += waited;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let agg = self.aggregates.lock().unwrap();
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            total_rate_limit_errors: self.total_rate_limit_errors.load(Ordering::Relaxed),
            cumulative_response_time: agg.response_time,
            cumulative_token_wait: agg.token_wait,
        }
    }

    /// Aggregate the samples recorded within the last `window`, pruning
    /// anything beyond the retention horizon along the way.
    pub fn window_stats(&self, window: Duration) -> WindowStats {
        let now = Instant::now();
        let mut agg = self.aggregates.lock().unwrap();

        while let Some(front) = agg.window.front() {
            if now.duration_since(front.at) > WINDOW_RETENTION {
                agg.window.pop_front();
            } else {
                break;
            }
        }

        let mut count = 0usize;
        let mut latency_total = Duration::ZERO;
        let mut rate_limited = 0usize;
        let mut retries = 0usize;
        for sample in agg.window.iter().rev() {
            if now.duration_since(sample.at) > window {
                break;
            }
            count += 1;
            latency_total += sample.latency;
            if sample.rate_limited {
                rate_limited += 1;
            }
            if sample.retry {
                retries += 1;
            }
        }

        if count == 0 {
            return WindowStats::empty();
        }

        WindowStats {
            samples: count,
            avg_latency: latency_total / count as u32,
            rate_limit_ratio: rate_limited as f64 / count as f64,
            retries_per_request: retries as f64 / count as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_monotonically() {
        let ledger = MetricsLedger::new();
        ledger.record_attempt(Duration::from_millis(10), false, false);
        ledger.record_attempt(Duration::from_millis(30), true, true);
        ledger.record_retry();
        ledger.record_rate_limit();

        let snap = ledger.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.total_retries, 1);
        assert_eq!(snap.total_rate_limit_errors, 1);
        assert_eq!(snap.cumulative_response_time, Duration::from_millis(40));
    }

    #[test]
    fn token_wait_accumulates() {
        let ledger = MetricsLedger::new();
        ledger.record_token_wait(Duration::from_millis(120));
        ledger.record_token_wait(Duration::from_millis(30));
        assert_eq!(
            ledger.snapshot().cumulative_token_wait,
            Duration::from_millis(150)
        );
    }

    #[test]
    fn window_stats_computes_ratios() {
        let ledger = MetricsLedger::new();
        for i in 0..10 {
            ledger.record_attempt(Duration::from_millis(100), i == 0, false);
        }

        let stats = ledger.window_stats(Duration::from_secs(30));
        assert_eq!(stats.samples, 10);
        assert_eq!(stats.avg_latency, Duration::from_millis(100));
        assert!((stats.rate_limit_ratio - 0.10).abs() < f64::EPSILON);
        assert_eq!(stats.retries_per_request, 0.0);
    }

    #[test]
    fn window_stats_empty_when_no_samples() {
        let ledger = MetricsLedger::new();
        let stats = ledger.window_stats(Duration::from_secs(30));
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.avg_latency, Duration::ZERO);
    }

    #[test]
    fn window_is_capacity_bounded() {
        let ledger = MetricsLedger::new();
        for _ in 0..(WINDOW_CAPACITY + 100) {
            ledger.record_attempt(Duration::from_millis(1), false, false);
        }
        let stats = ledger.window_stats(Duration::from_secs(300));
        assert_eq!(stats.samples, WINDOW_CAPACITY);
        // The monotonic counter keeps the full total regardless of pruning.
        assert_eq!(
            ledger.snapshot().total_requests,
            (WINDOW_CAPACITY + 100) as u64
        );
    }
}
