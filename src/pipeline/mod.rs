//! Asynchronous ingestion pipeline: staging buffer (C1), the two queue
//! flavors (C2 double-buffered, C3 zero-copy ring), the consumer worker
//! (C4), and rolling metrics shared by the worker.

pub mod config;
pub mod dbuf_queue;
pub mod metrics;
pub mod ring_queue;
pub mod staging;
pub mod worker;

pub use config::QueueConfig;
pub use dbuf_queue::DoubleBufferedQueue;
pub use metrics::MetricsSnapshot;
pub use ring_queue::{RingEntry, RingQueue, SwapBuffer};
pub use staging::StagingBuffer;
pub use worker::{ConsumerWorker, DeadLetterItem, ErrorStrategy, WorkerConfig};
