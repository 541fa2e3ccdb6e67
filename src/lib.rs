//! `ixdb` is an embedded transactional key-value store built on top of
//! LMDB, adding secondary indexes maintained inline with every mutation
//! and an asynchronous ingestion pipeline for high-throughput writers.
//!
//! A [Store] owns the memory-mapped environment and the extractor
//! registry; a [Tree] is a named sub-map within it, optionally carrying
//! attached indexes; a [Txn] is a single read or write transaction
//! against one tree, exposing point, scan, and bulk operations that keep
//! the primary tree and its indexes consistent.
//!
//! The `pipeline` module provides the staging buffer, the two queue
//! flavors, and the consumer worker used to batch writes from many
//! producer threads into a tree without each producer taking its own
//! LMDB write transaction.

pub mod error;
pub mod extractor;
pub mod index;
pub mod mem;
pub mod metadata;
pub mod pipeline;
pub mod store;
pub mod tree;
pub mod txn;
pub mod util;

pub use crate::error::{Category, Code, Error, Result};
pub use crate::extractor::{Extractor, ExtractorRegistry};
pub use crate::index::IndexConfig;
pub use crate::mem::MemSurface;
pub use crate::pipeline::{ConsumerWorker, ErrorStrategy, QueueConfig, WorkerConfig};
pub use crate::store::{Store, StoreConfig, StoreFlags};
pub use crate::tree::{Tree, TreeOpenOptions};
pub use crate::txn::Txn;
