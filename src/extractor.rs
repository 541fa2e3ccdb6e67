//! Extractor contract and the id-keyed registry used to reattach
//! secondary indexes across restarts without inline code pointers.

use std::{collections::HashMap, sync::Arc};

/// `extract(value, user_data) -> (should_index, index_key)`.
///
/// Implementations must be deterministic and pure: given the same
/// `(value, user_data)` pair they always return the same result, and they
/// must not retain borrows of their inputs past the call.
pub trait Extractor: Send + Sync {
    fn extract(&self, value: &[u8], user_data: &[u8]) -> (bool, Vec<u8>);
}

impl<F> Extractor for F
where
    F: Fn(&[u8], &[u8]) -> (bool, Vec<u8>) + Send + Sync,
{
    fn extract(&self, value: &[u8], user_data: &[u8]) -> (bool, Vec<u8>) {
        (self)(value, user_data)
    }
}

/// Bit flags an extractor may be registered under, used only to record
/// which `(unique, sparse)` combinations an extractor was validated
/// against at registration time; the registry itself is keyed by id alone.
pub const FLAG_UNIQUE: u32 = 0x1;
pub const FLAG_SPARSE: u32 = 0x2;

/// Compose a 64-bit extractor id from a `(major, minor)` version pair.
pub fn extractor_id(major: u32, minor: u32) -> u64 {
    ((major as u64) << 32) | (minor as u64)
}

/// Split an extractor id back into its `(major, minor)` components.
pub fn split_extractor_id(id: u64) -> (u32, u32) {
    ((id >> 32) as u32, (id & 0xFFFF_FFFF) as u32)
}

struct Entry {
    extractor: Arc<dyn Extractor>,
    flags_mask: u32,
}

/// `extractor_id -> extraction_fn` registry. Registrations are additive:
/// registering the same id again replaces the prior entry but does not
/// retroactively reattach indexes on already-open trees.
#[derive(Default)]
pub struct ExtractorRegistry {
    entries: HashMap<u64, Entry>,
}

impl ExtractorRegistry {
    pub fn new() -> ExtractorRegistry {
        ExtractorRegistry {
            entries: HashMap::new(),
        }
    }

    /// Register `extractor` under `id` for every `(unique, sparse)` flag
    /// combination allowed by `flags_mask` (e.g. passing
    /// `FLAG_UNIQUE | FLAG_SPARSE` documents that this extractor is valid
    /// for unique, sparse, and plain indexes alike). The registry map
    /// itself stays keyed by `id` only, per the external-interfaces
    /// contract; `flags_mask` is advisory bookkeeping consulted by
    /// [ExtractorRegistry::supports].
    pub fn register_key_extractor<E>(&mut self, id: u64, flags_mask: u32, extractor: E)
    where
        E: Extractor + 'static,
    {
        self.entries.insert(
            id,
            Entry {
                extractor: Arc::new(extractor),
                flags_mask,
            },
        );
    }

    /// Same as [ExtractorRegistry::register_key_extractor] but for a
    /// pre-built `Arc<dyn Extractor>`, used when the index engine forwards
    /// an already-boxed extraction function supplied by `IndexConfig`.
    pub fn register_arc(&mut self, id: u64, flags_mask: u32, extractor: Arc<dyn Extractor>) {
        self.entries.insert(id, Entry { extractor, flags_mask });
    }

    pub fn lookup(&self, id: u64) -> Option<Arc<dyn Extractor>> {
        self.entries.get(&id).map(|e| Arc::clone(&e.extractor))
    }

    /// Whether the extractor registered under `id` was declared to support
    /// the given flag combination. Returns `false` when unregistered.
    pub fn supports(&self, id: u64, flags: u32) -> bool {
        match self.entries.get(&id) {
            Some(e) => (e.flags_mask & flags) == flags,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "extractor_test.rs"]
mod extractor_test;
