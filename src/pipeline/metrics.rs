//! Rolling metrics shared by the consumer worker (C4).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const LATENCY_SAMPLE_CAP: usize = 100;
const CONSECUTIVE_ERROR_UNHEALTHY_THRESHOLD: u64 = 10;

/// Point-in-time read of a [Metrics] collector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub total_items_processed: u64,
    pub total_batches_processed: u64,
    pub items_per_second: f64,
    pub current_queue_depth: usize,
    pub queue_utilization: f64,
    pub avg_batch_latency_ms: f64,
    pub max_batch_latency_ms: f64,
    pub p95_batch_latency_ms: f64,
    pub total_errors: u64,
    pub consecutive_errors: u64,
    pub items_in_dlq: usize,
    pub uptime_seconds: f64,
    pub is_running: bool,
    pub is_healthy: bool,
}

/// Accumulates counters and a bounded window of batch-latency samples.
/// All fields are independently thread-safe; [Metrics::snapshot] reads
/// them without a single global lock, so a snapshot is a best-effort
/// point-in-time view rather than a transactional one.
pub struct Metrics {
    started_at: Instant,
    total_items_processed: AtomicU64,
    total_batches_processed: AtomicU64,
    total_errors: AtomicU64,
    consecutive_errors: AtomicU64,
    items_in_dlq: AtomicUsize,
    running: AtomicBool,
    latency_samples_ms: Mutex<VecDeque<f64>>,
    max_batch_latency_ms: Mutex<f64>,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics {
            started_at: Instant::now(),
            total_items_processed: AtomicU64::new(0),
            total_batches_processed: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            consecutive_errors: AtomicU64::new(0),
            items_in_dlq: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            latency_samples_ms: Mutex::new(VecDeque::with_capacity(LATENCY_SAMPLE_CAP)),
            max_batch_latency_ms: Mutex::new(0.0),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn record_batch(&self, items: u64, latency_ms: f64) {
        self.total_items_processed.fetch_add(items, Ordering::SeqCst);
        self.total_batches_processed.fetch_add(1, Ordering::SeqCst);
        self.consecutive_errors.store(0, Ordering::SeqCst);

        let mut samples = self.latency_samples_ms.lock().unwrap();
        if samples.len() >= LATENCY_SAMPLE_CAP {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
        drop(samples);

        let mut max = self.max_batch_latency_ms.lock().unwrap();
        if latency_ms > *max {
            *max = latency_ms;
        }
    }

    pub fn record_error(&self) -> u64 {
        self.total_errors.fetch_add(1, Ordering::SeqCst);
        self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn set_items_in_dlq(&self, count: usize) {
        self.items_in_dlq.store(count, Ordering::SeqCst);
    }

    pub fn consecutive_errors(&self) -> u64 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.consecutive_errors.load(Ordering::SeqCst) < CONSECUTIVE_ERROR_UNHEALTHY_THRESHOLD
    }

    /// Render a full snapshot given the caller's current queue depth and
    /// capacity (the collector itself does not know which queue it is
    /// attached to).
    pub fn snapshot(&self, queue_depth: usize, queue_capacity: usize) -> MetricsSnapshot {
        let uptime = self.started_at.elapsed().as_secs_f64();
        let total_items = self.total_items_processed.load(Ordering::SeqCst);
        let total_batches = self.total_batches_processed.load(Ordering::SeqCst);

        let samples = self.latency_samples_ms.lock().unwrap();
        let avg_latency = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };
        let p95_latency = percentile_95(&samples);
        drop(samples);

        let queue_utilization = if queue_capacity == 0 {
            0.0
        } else {
            queue_depth as f64 / queue_capacity as f64
        };

        MetricsSnapshot {
            total_items_processed: total_items,
            total_batches_processed: total_batches,
            items_per_second: if uptime > 0.0 { total_items as f64 / uptime } else { 0.0 },
            current_queue_depth: queue_depth,
            queue_utilization,
            avg_batch_latency_ms: avg_latency,
            max_batch_latency_ms: *self.max_batch_latency_ms.lock().unwrap(),
            p95_batch_latency_ms: p95_latency,
            total_errors: self.total_errors.load(Ordering::SeqCst),
            consecutive_errors: self.consecutive_errors.load(Ordering::SeqCst),
            items_in_dlq: self.items_in_dlq.load(Ordering::SeqCst),
            uptime_seconds: uptime,
            is_running: self.running.load(Ordering::SeqCst),
            is_healthy: self.is_healthy(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Metrics {
        Metrics::new()
    }
}

/// p95 over the current sample window, via a simple sort (the window is
/// capped at 100 entries, so this is cheap enough to redo on every
/// snapshot rather than maintain an order statistic incrementally).
fn percentile_95(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_test;
