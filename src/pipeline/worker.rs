//! Consumer worker (C4): drains a [RingQueue] into a [Tree], one write
//! transaction per batch, applying a configurable error strategy on
//! persistent per-item failure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, warn};

use crate::error::{Code, Error, Result};
use crate::pipeline::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::ring_queue::{RingEntry, RingQueue};
use crate::tree::Tree;

/// What to do when an item cannot be written after exhausting retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Abort the in-flight transaction and stop the worker.
    FailFast,
    /// Retry with exponential backoff, then fall through to the dead
    /// letter queue — the same terminal state as [ErrorStrategy::Dlq].
    Retry,
    /// Move the item straight to the dead letter queue.
    Dlq,
    /// Log the failure and drop the item. Data is lost by design.
    LogContinue,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub error_strategy: ErrorStrategy,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// 0 means unbounded: one write transaction per swapped-out batch.
    pub max_batch_size: usize,
    pub commit_interval_ms: u64,
    pub enable_latency_tracking: bool,
    pub metrics_update_interval_s: u64,
}

impl WorkerConfig {
    pub fn new() -> WorkerConfig {
        WorkerConfig {
            error_strategy: ErrorStrategy::Retry,
            max_retries: 3,
            retry_backoff_ms: 10,
            max_batch_size: 0,
            commit_interval_ms: 100,
            enable_latency_tracking: true,
            metrics_update_interval_s: 1,
        }
    }

    pub fn set_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    pub fn set_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn set_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn set_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn set_commit_interval_ms(mut self, ms: u64) -> Self {
        self.commit_interval_ms = ms;
        self
    }

    pub fn set_enable_latency_tracking(mut self, enable: bool) -> Self {
        self.enable_latency_tracking = enable;
        self
    }

    pub fn set_metrics_update_interval_s(mut self, s: u64) -> Self {
        self.metrics_update_interval_s = s;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig::new()
    }
}

/// An item that exhausted its retry budget, or was routed directly to the
/// dead letter queue. Kept in a `VecDeque` rather than a hand-rolled
/// linked list — push-front/FIFO-drain is all the protocol needs.
#[derive(Debug, Clone)]
pub struct DeadLetterItem {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub retry_count: u32,
    pub last_attempt: Instant,
}

/// A single worker thread draining a [RingQueue] into a [Tree].
pub struct ConsumerWorker {
    queue: Arc<RingQueue>,
    tree: Tree,
    config: WorkerConfig,
    metrics: Arc<Metrics>,
    dlq: Arc<Mutex<VecDeque<DeadLetterItem>>>,
    should_stop: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ConsumerWorker {
    pub fn new(queue: Arc<RingQueue>, tree: Tree, config: WorkerConfig) -> ConsumerWorker {
        ConsumerWorker {
            queue,
            tree,
            config,
            metrics: Arc::new(Metrics::new()),
            dlq: Arc::new(Mutex::new(VecDeque::new())),
            should_stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the worker thread. Fails if one is already running.
    pub fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return Err(Error::new(Code::Generic, "worker already running".to_string()));
        }
        self.should_stop.store(false, Ordering::SeqCst);
        self.metrics.set_running(true);

        let queue = self.queue.clone();
        let tree = self.tree.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();
        let dlq = self.dlq.clone();
        let should_stop = self.should_stop.clone();

        *handle = Some(thread::spawn(move || {
            worker_loop(queue, tree, config, metrics, dlq, should_stop);
        }));
        Ok(())
    }

    /// Request cooperative shutdown and join the worker thread. Wakes the
    /// worker via `should_stop` plus a queue flush, per the "cooperative
    /// cancellation only" model: no forced interruption mid-transaction.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
        self.queue.flush();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.join().ok();
        }
        self.metrics.set_running(false);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.queue.depth(), self.queue.capacity())
    }

    pub fn dlq_len(&self) -> usize {
        self.dlq.lock().unwrap().len()
    }

    pub fn dlq_items(&self) -> Vec<DeadLetterItem> {
        self.dlq.lock().unwrap().iter().cloned().collect()
    }
}

fn worker_loop(
    queue: Arc<RingQueue>,
    tree: Tree,
    config: WorkerConfig,
    metrics: Arc<Metrics>,
    dlq: Arc<Mutex<VecDeque<DeadLetterItem>>>,
    should_stop: Arc<AtomicBool>,
) {
    'outer: loop {
        if should_stop.load(Ordering::SeqCst) && queue.depth() == 0 {
            break;
        }
        queue.wait_nonempty();
        if queue.depth() == 0 {
            if should_stop.load(Ordering::SeqCst) {
                break;
            }
            continue;
        }

        let swapped = queue.swap_buffer(0);
        if swapped.count() == 0 {
            continue;
        }
        let entries = swapped.drain_with_release(|_key, _value| {});

        let chunk_size = if config.max_batch_size == 0 {
            entries.len().max(1)
        } else {
            config.max_batch_size
        };
        for chunk in entries.chunks(chunk_size) {
            let fatal = process_chunk(&tree, chunk, &config, &metrics, &dlq);
            if fatal {
                should_stop.store(true, Ordering::SeqCst);
                break 'outer;
            }
        }
    }
    metrics.set_running(false);
}

/// Process one batch inside a single write transaction. Returns `true`
/// when the failure was fatal (transaction aborted, worker must stop).
fn process_chunk(
    tree: &Tree,
    chunk: &[RingEntry],
    config: &WorkerConfig,
    metrics: &Metrics,
    dlq: &Mutex<VecDeque<DeadLetterItem>>,
) -> bool {
    let started = Instant::now();
    let mut txn = match tree.begin_write() {
        Ok(txn) => txn,
        Err(err) => {
            error!("consumer worker could not begin a write transaction: {:?}", err);
            return true;
        }
    };

    let mut processed: u64 = 0;
    let mut fatal = false;
    for entry in chunk {
        let mut attempt = 0u32;
        loop {
            match txn.put(&entry.key, &entry.value) {
                Ok(()) => {
                    processed += 1;
                    break;
                }
                Err(err) => {
                    if attempt < config.max_retries {
                        attempt += 1;
                        thread::sleep(Duration::from_millis(config.retry_backoff_ms << attempt.min(16)));
                        continue;
                    }
                    metrics.record_error();
                    match config.error_strategy {
                        ErrorStrategy::FailFast => {
                            warn!("fail-fast: giving up on key after {} retries: {:?}", attempt, err);
                            fatal = true;
                        }
                        // RETRY exhaustion and DLQ are the same terminal state: the
                        // item always lands in the dead letter queue rather than
                        // being silently dropped.
                        ErrorStrategy::Retry | ErrorStrategy::Dlq => {
                            let mut guard = dlq.lock().unwrap();
                            guard.push_front(DeadLetterItem {
                                key: entry.key.clone(),
                                value: entry.value.clone(),
                                retry_count: attempt,
                                last_attempt: Instant::now(),
                            });
                            metrics.set_items_in_dlq(guard.len());
                        }
                        ErrorStrategy::LogContinue => {
                            warn!("log-continue: dropping key after {} retries: {:?}", attempt, err);
                        }
                    }
                    break;
                }
            }
        }
        if fatal {
            break;
        }
    }

    if fatal {
        txn.abort();
        return true;
    }
    if let Err(err) = txn.commit() {
        error!("consumer worker commit failed: {:?}", err);
        return true;
    }

    let latency_ms = if config.enable_latency_tracking {
        started.elapsed().as_secs_f64() * 1000.0
    } else {
        0.0
    };
    metrics.record_batch(processed, latency_ms);
    false
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
