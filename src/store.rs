//! Store handle (C5): owns the LMDB environment, the extractor registry,
//! and the lazily-opened metadata sub-map shared by every [crate::tree::Tree]
//! opened against it.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use lmdb::Transaction;

use crate::{
    err_at,
    error::{self, Result},
    extractor::{Extractor, ExtractorRegistry},
    mem::MemSurface,
    metadata::META_DBI_NAME,
};

/// Environment-wide durability/IO knobs, set once at [Store::open] time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreFlags {
    pub no_sync: bool,
    pub no_meta_sync: bool,
    pub no_tls: bool,
    pub read_only: bool,
}

impl Default for StoreFlags {
    fn default() -> StoreFlags {
        StoreFlags {
            no_sync: false,
            no_meta_sync: false,
            no_tls: false,
            read_only: false,
        }
    }
}

impl StoreFlags {
    fn to_lmdb(self) -> lmdb::EnvironmentFlags {
        let mut flags = lmdb::EnvironmentFlags::empty();
        if self.no_sync {
            flags.insert(lmdb::EnvironmentFlags::NO_SYNC);
        }
        if self.no_meta_sync {
            flags.insert(lmdb::EnvironmentFlags::NO_META_SYNC);
        }
        if self.no_tls {
            flags.insert(lmdb::EnvironmentFlags::NO_TLS);
        }
        if self.read_only {
            flags.insert(lmdb::EnvironmentFlags::READ_ONLY);
        }
        flags
    }
}

/// Configuration accepted by [Store::open].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub map_size: usize,
    pub max_trees: u32,
    pub max_readers: u32,
    pub version_tag: String,
    pub flags: StoreFlags,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> StoreConfig {
        StoreConfig {
            path: path.as_ref().to_path_buf(),
            map_size: 10 * 1024 * 1024 * 1024,
            max_trees: 64,
            max_readers: 126,
            version_tag: "ixdb-0.1".to_string(),
            flags: StoreFlags::default(),
        }
    }

    pub fn set_map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    pub fn set_max_trees(&mut self, max_trees: u32) -> &mut Self {
        self.max_trees = max_trees;
        self
    }

    pub fn set_max_readers(&mut self, max_readers: u32) -> &mut Self {
        self.max_readers = max_readers;
        self
    }

    pub fn set_version_tag<S: Into<String>>(&mut self, version_tag: S) -> &mut Self {
        self.version_tag = version_tag.into();
        self
    }

    pub fn set_flags(&mut self, flags: StoreFlags) -> &mut Self {
        self.flags = flags;
        self
    }
}

struct StoreInner {
    env: lmdb::Environment,
    config: StoreConfig,
    registry: RwLock<ExtractorRegistry>,
    meta_dbi: Mutex<Option<lmdb::Database>>,
}

/// Handle onto an open store. Cheaply cloneable: every clone shares the
/// same underlying environment, extractor registry, and metadata sub-map.
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

impl Store {
    /// Open (creating on first use) the LMDB environment at `config.path`.
    pub fn open(config: StoreConfig) -> Result<Store> {
        err_at!(Io, std::fs::create_dir_all(&config.path))?;

        // one dbi per tree, one per secondary index, plus the metadata dbi.
        let max_dbs = config.max_trees.saturating_mul(2).saturating_add(2);

        let mut builder = lmdb::Environment::new();
        builder
            .set_flags(config.flags.to_lmdb())
            .set_map_size(config.map_size)
            .set_max_dbs(max_dbs)
            .set_max_readers(config.max_readers);

        let env = error::lmdb_result(builder.open(&config.path))?;

        Ok(Store(Arc::new(StoreInner {
            env,
            config,
            registry: RwLock::new(ExtractorRegistry::new()),
            meta_dbi: Mutex::new(None),
        })))
    }

    /// Flush all outstanding writes to disk and drop the environment.
    /// The handle (and any clones) remain usable afterwards only for
    /// inspection; further tree/txn operations will fail.
    pub fn close(self) -> Result<()> {
        error::lmdb_result(self.0.env.sync(true))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.0.config
    }

    pub fn mem(&self) -> MemSurface {
        MemSurface::new(self.0.config.map_size)
    }

    pub fn register_key_extractor<E>(&self, id: u64, flags_mask: u32, extractor: E)
    where
        E: Extractor + 'static,
    {
        let mut registry = self.0.registry.write().unwrap();
        registry.register_key_extractor(id, flags_mask, extractor);
    }

    pub(crate) fn lookup_extractor(&self, id: u64) -> Option<Arc<dyn Extractor>> {
        self.0.registry.read().unwrap().lookup(id)
    }

    pub(crate) fn register_arc_extractor(&self, id: u64, flags_mask: u32, extractor: Arc<dyn Extractor>) {
        self.0.registry.write().unwrap().register_arc(id, flags_mask, extractor);
    }

    pub(crate) fn extractor_supports(&self, id: u64, flags: u32) -> bool {
        self.0.registry.read().unwrap().supports(id, flags)
    }

    pub(crate) fn env(&self) -> &lmdb::Environment {
        &self.0.env
    }

    /// Lazily open (creating on first access) the `__meta__` sub-map used
    /// to persist index descriptors across restarts.
    pub(crate) fn meta_dbi(&self) -> Result<lmdb::Database> {
        let mut guard = self.0.meta_dbi.lock().unwrap();
        if let Some(dbi) = *guard {
            return Ok(dbi);
        }
        let dbi = error::lmdb_result(
            self.0
                .env
                .create_db(Some(META_DBI_NAME), lmdb::DatabaseFlags::empty()),
        )?;
        *guard = Some(dbi);
        Ok(dbi)
    }

    pub(crate) fn open_or_create_dbi(&self, name: &str, dupsort: bool) -> Result<lmdb::Database> {
        let mut flags = lmdb::DatabaseFlags::empty();
        if dupsort {
            flags.insert(lmdb::DatabaseFlags::DUP_SORT);
        }
        error::lmdb_result(self.0.env.create_db(Some(name), flags))
    }

    pub(crate) fn drop_dbi(&self, dbi: lmdb::Database) -> Result<()> {
        let txn = error::lmdb_result(self.0.env.begin_rw_txn())?;
        error::lmdb_result(unsafe { txn.drop_db(dbi) })?;
        error::lmdb_result(txn.commit())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
