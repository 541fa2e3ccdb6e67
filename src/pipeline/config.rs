//! Shared queue configuration (C2/C3), built the same way as
//! [StoreConfig](crate::store::StoreConfig)/[TreeOpenOptions](crate::tree::TreeOpenOptions):
//! public-ish fields plus `new`/`set_*`.

use std::sync::Arc;

/// Capacity and full-queue callback shared by [DoubleBufferedQueue](crate::pipeline::DoubleBufferedQueue)
/// and [RingQueue](crate::pipeline::RingQueue). For `DoubleBufferedQueue`
/// `capacity` is the entry count of each of the two staging buffers; for
/// `RingQueue` it is rounded up to the next power of two.
#[derive(Clone)]
pub struct QueueConfig {
    capacity: usize,
    on_full: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl QueueConfig {
    pub fn new(capacity: usize) -> QueueConfig {
        QueueConfig {
            capacity,
            on_full: None,
        }
    }

    pub fn set_on_full<F>(mut self, on_full: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_full = Some(Arc::new(on_full));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn notify_full(&self) {
        if let Some(cb) = &self.on_full {
            cb();
        }
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn test_default_has_no_callback() {
        let config = QueueConfig::new(16);
        assert_eq!(config.capacity(), 16);
        config.notify_full(); // must not panic
    }

    #[test]
    fn test_set_on_full_invokes_callback() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let config = QueueConfig::new(4).set_on_full(move || flag.store(true, Ordering::SeqCst));
        config.notify_full();
        assert!(called.load(Ordering::SeqCst));
    }
}
