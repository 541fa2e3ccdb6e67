//! Double-buffered MPSC queue (C2).
//!
//! Owns two [StagingBuffer]s of identical capacity behind one mutex, a
//! non-empty and an empty condition variable, and a single consumer
//! thread's lifecycle. Any number of producer threads may call
//! [DoubleBufferedQueue::push] concurrently; exactly one consumer thread
//! drains the queue at a time.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use crate::error::{Code, Error, Result};
use crate::pipeline::config::QueueConfig;
use crate::pipeline::staging::StagingBuffer;

struct Inner<T> {
    active: StagingBuffer<T>,
    spare: StagingBuffer<T>,
    running: bool,
}

struct Shared<T> {
    config: QueueConfig,
    state: Mutex<Inner<T>>,
    nonempty: Condvar,
    empty: Condvar,
}

/// Double-buffered queue: cheap to push into, with all consumption work
/// happening on a batch swapped out from under producers.
pub struct DoubleBufferedQueue<T> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<T: Send + 'static> DoubleBufferedQueue<T> {
    pub fn new(config: QueueConfig) -> DoubleBufferedQueue<T> {
        let capacity = config.capacity();
        let inner = Inner {
            active: StagingBuffer::new(capacity),
            spare: StagingBuffer::new(capacity),
            running: true,
        };
        DoubleBufferedQueue {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(inner),
                nonempty: Condvar::new(),
                empty: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity()
    }

    /// Push one entry. Returns `false` (non-fatal) when the active buffer
    /// is full, after invoking the configured `on_full` callback outside
    /// the lock.
    pub fn push(&self, entry: T) -> bool {
        let mut guard = self.shared.state.lock().unwrap();
        if guard.active.is_full() {
            drop(guard);
            self.shared.config.notify_full();
            return false;
        }
        guard.active.push(entry).expect("checked not full above");
        self.shared.nonempty.notify_one();
        true
    }

    pub fn depth(&self) -> usize {
        self.shared.state.lock().unwrap().active.count()
    }

    /// Block the calling thread until both buffers are empty.
    pub fn drain(&self) {
        let mut guard = self.shared.state.lock().unwrap();
        while !(guard.active.is_empty() && guard.spare.is_empty()) {
            guard = self.shared.empty.wait(guard).unwrap();
        }
    }

    /// Spawn the single consumer worker. Fails if one is already running.
    pub fn start_consumer<C, E>(&self, consumer: C, error_handler: E) -> Result<()>
    where
        C: Fn(&T) -> bool + Send + 'static,
        E: Fn(&T) -> bool + Send + 'static,
    {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return Err(Error::new(
                Code::Generic,
                "consumer already running for this queue".to_string(),
            ));
        }
        let shared = self.shared.clone();
        *worker = Some(thread::spawn(move || {
            worker_loop(shared, consumer, error_handler)
        }));
        Ok(())
    }

    /// Stop the consumer thread and join it. A no-op if none is running.
    pub fn stop_consumer(&self) {
        {
            let mut guard = self.shared.state.lock().unwrap();
            guard.running = false;
        }
        self.shared.nonempty.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.join().ok();
        }
    }

    /// Stop the consumer, then free every entry left in either buffer
    /// using `free_fn`.
    pub fn destroy<F>(self, mut free_fn: F)
    where
        F: FnMut(T),
    {
        self.stop_consumer();
        let mut guard = self.shared.state.lock().unwrap();
        for entry in guard.active.drain_all() {
            free_fn(entry);
        }
        for entry in guard.spare.drain_all() {
            free_fn(entry);
        }
    }
}

fn worker_loop<T, C, E>(shared: Arc<Shared<T>>, consumer: C, error_handler: E)
where
    T: Send + 'static,
    C: Fn(&T) -> bool,
    E: Fn(&T) -> bool,
{
    loop {
        let mut guard: MutexGuard<Inner<T>> = shared.state.lock().unwrap();
        while guard.active.is_empty() && guard.running {
            guard = shared.nonempty.wait(guard).unwrap();
        }
        if !guard.running && guard.active.is_empty() {
            return;
        }

        std::mem::swap(&mut guard.active, &mut guard.spare);
        shared.empty.notify_all();
        let mut processing =
            std::mem::replace(&mut guard.spare, StagingBuffer::new(shared.config.capacity()));
        drop(guard);

        processing.consume(&consumer, &error_handler);
        debug_assert!(
            processing.is_empty(),
            "consumer error handler must fully discard every entry"
        );

        let mut guard = shared.state.lock().unwrap();
        guard.spare = processing;
        if guard.active.is_empty() {
            shared.empty.notify_all();
        }
    }
}

#[cfg(test)]
#[path = "dbuf_queue_test.rs"]
mod dbuf_queue_test;
