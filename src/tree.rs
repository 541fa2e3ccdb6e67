//! Tree handle and lifecycle (C6): a named ordered sub-map inside a
//! [Store], tracking its attached secondary indexes.

use std::sync::{Arc, Mutex};

use lmdb::{Cursor, Transaction};

use crate::{
    error::{self, Code, Result},
    index::{IndexConfig, IndexDescriptor},
    metadata::{self, IndexMeta},
    store::Store,
    util::spinlock::Spinlock,
};

/// Options accepted by [Tree::open].
#[derive(Debug, Clone)]
pub struct TreeOpenOptions {
    pub create_if_missing: bool,
    pub entry_count_hint: usize,
}

impl TreeOpenOptions {
    pub fn new() -> TreeOpenOptions {
        TreeOpenOptions {
            create_if_missing: true,
            entry_count_hint: 0,
        }
    }

    pub fn set_create_if_missing(&mut self, create_if_missing: bool) -> &mut Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub fn set_entry_count_hint(&mut self, entry_count_hint: usize) -> &mut Self {
        self.entry_count_hint = entry_count_hint;
        self
    }
}

impl Default for TreeOpenOptions {
    fn default() -> TreeOpenOptions {
        TreeOpenOptions::new()
    }
}

pub type MergeFn = dyn Fn(Option<&[u8]>, &[u8]) -> Vec<u8> + Send + Sync;
pub type CompareFn = dyn Fn(&[u8], &[u8]) -> std::cmp::Ordering + Send + Sync;

/// A named, ordered sub-map inside a [Store]. Cheap to clone: clones share
/// the same attached-index list and merge/compare hooks.
#[derive(Clone)]
pub struct Tree {
    pub(crate) store: Store,
    pub(crate) name: String,
    pub(crate) dbi: lmdb::Database,
    pub(crate) indexes: Arc<Spinlock<Vec<IndexDescriptor>>>,
    pub(crate) merge_fn: Arc<Mutex<Option<Arc<MergeFn>>>>,
    pub(crate) compare_fn: Arc<Mutex<Option<Arc<CompareFn>>>>,
    pub(crate) entry_count_hint: usize,
}

impl Tree {
    /// Open (creating if `options.create_if_missing`) the named sub-map,
    /// then auto-reattach every persisted index for it (§4.6).
    pub fn open(store: &Store, name: &str, options: TreeOpenOptions) -> Result<Tree> {
        let _ = options.create_if_missing; // lmdb always creates named dbs on first open
        let dbi = store.open_or_create_dbi(name, false)?;

        let tree = Tree {
            store: store.clone(),
            name: name.to_string(),
            dbi,
            indexes: Arc::new(Spinlock::new(Vec::new())),
            merge_fn: Arc::new(Mutex::new(None)),
            compare_fn: Arc::new(Mutex::new(None)),
            entry_count_hint: options.entry_count_hint,
        };

        for index_name in tree.list_persisted_indexes()? {
            tree.load_index_metadata(&index_name)?;
        }

        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn dbi(&self) -> lmdb::Database {
        self.dbi
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub fn indexes_snapshot(&self) -> Vec<String> {
        self.indexes
            .read()
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    /// Free in-memory descriptors (running each index's cleanup hook
    /// exactly once). The persisted sub-maps and metadata are untouched.
    pub fn close(self) {
        let mut guard = self.indexes.write();
        for descriptor in guard.drain(..) {
            descriptor.run_cleanup();
        }
    }

    pub fn set_merge_fn<F>(&self, merge_fn: F)
    where
        F: Fn(Option<&[u8]>, &[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        *self.merge_fn.lock().unwrap() = Some(Arc::new(merge_fn));
    }

    pub fn set_compare<F>(&self, compare: F)
    where
        F: Fn(&[u8], &[u8]) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        // lmdb-rs does not expose a safe custom-comparator hook on an
        // already-open Database; the registered function is therefore
        // consulted only by in-process cursor helpers built atop this
        // tree (e.g. a future merge-sort scan), not by LMDB's own
        // internal ordering. See DESIGN.md for the open-question
        // resolution.
        *self.compare_fn.lock().unwrap() = Some(Arc::new(compare));
    }

    pub(crate) fn merge(&self, existing: Option<&[u8]>, value: &[u8]) -> Vec<u8> {
        match &*self.merge_fn.lock().unwrap() {
            Some(f) => f(existing, value),
            None => value.to_vec(),
        }
    }

    pub fn add_index(&self, config: IndexConfig) -> Result<()> {
        crate::index::add_index(self, config)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        crate::index::drop_index(self, name)
    }

    pub fn populate_index(&self, name: &str) -> Result<()> {
        crate::index::populate_index(self, name)
    }

    pub fn verify_indexes(&self) -> Result<()> {
        crate::index::verify_indexes(self)
    }

    /// Primary keys filed under `index_key` in the named index, ascending.
    pub fn index_seek(&self, name: &str, index_key: &[u8]) -> Result<Vec<Vec<u8>>> {
        crate::index::index_seek(self, name, index_key)
    }

    fn list_persisted_indexes(&self) -> Result<Vec<String>> {
        let meta_dbi = self.store.meta_dbi()?;
        let txn = error::lmdb_result(self.store.env().begin_ro_txn())?;
        let prefix = metadata::meta_prefix(&self.name);

        let mut names = Vec::new();
        {
            let mut cursor = error::lmdb_result(txn.open_ro_cursor(meta_dbi))?;
            for item in cursor.iter_from(prefix.as_slice()) {
                let (key, _val) = error::lmdb_result(item)?;
                if !crate::util::has_prefix(key, &prefix) {
                    break;
                }
                let index_name = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                names.push(index_name);
            }
        }
        Ok(names)
    }

    /// Begins a read transaction, fetches and decodes the persisted
    /// descriptor for `index_name`, looks up its extractor — on miss,
    /// warns and returns without attaching — then opens the physical
    /// sub-map and appends the descriptor in-memory.
    fn load_index_metadata(&self, index_name: &str) -> Result<()> {
        let meta_dbi = self.store.meta_dbi()?;
        let key = metadata::meta_key(&self.name, index_name);

        let raw = {
            let txn = error::lmdb_result(self.store.env().begin_ro_txn())?;
            match txn.get(meta_dbi, &key) {
                Ok(bytes) => bytes.to_vec(),
                Err(lmdb::Error::NotFound) => return Ok(()),
                Err(err) => return Err(error::from_lmdb(err)),
            }
        };
        let meta = IndexMeta::decode(&raw)?;

        let extractor = match self.store.lookup_extractor(meta.extractor_id) {
            Some(extractor) => extractor,
            None => {
                log::warn!(
                    "tree {:?}: skipping index {:?}, unregistered extractor id {:#x}",
                    self.name,
                    index_name,
                    meta.extractor_id
                );
                return Ok(());
            }
        };

        let physical_name = metadata::index_physical_name(&self.name, index_name);
        let dbi = self.store.open_or_create_dbi(&physical_name, !meta.unique)?;

        let descriptor = IndexDescriptor::new(
            index_name.to_string(),
            dbi,
            meta.extractor_id,
            extractor,
            meta.unique,
            meta.sparse,
            meta.user_data,
            None,
        );
        self.indexes.write().push(descriptor);
        Ok(())
    }

    /// Drop `name` and every physical index sub-map, metadata record, and
    /// the main sub-map itself, inside a single write transaction.
    pub fn delete(store: &Store, name: &str) -> Result<()> {
        let meta_dbi = store.meta_dbi()?;
        let catalog_dbi = error::lmdb_result(store.env().open_db(None))?;
        let index_prefix = metadata::index_physical_prefix(name);
        let meta_prefix = metadata::meta_prefix(name);

        let mut index_dbi_names = Vec::new();
        {
            let txn = error::lmdb_result(store.env().begin_ro_txn())?;
            let mut cursor = error::lmdb_result(txn.open_ro_cursor(catalog_dbi))?;
            for item in cursor.iter_from(index_prefix.as_bytes()) {
                let (key, _val) = error::lmdb_result(item)?;
                if !crate::util::has_prefix(key, index_prefix.as_bytes()) {
                    break;
                }
                index_dbi_names.push(String::from_utf8_lossy(key).into_owned());
            }
        }

        let mut meta_keys = Vec::new();
        {
            let txn = error::lmdb_result(store.env().begin_ro_txn())?;
            let mut cursor = error::lmdb_result(txn.open_ro_cursor(meta_dbi))?;
            for item in cursor.iter_from(meta_prefix.as_slice()) {
                let (key, _val) = error::lmdb_result(item)?;
                if !crate::util::has_prefix(key, &meta_prefix) {
                    break;
                }
                meta_keys.push(key.to_vec());
            }
        }

        let txn = error::lmdb_result(store.env().begin_rw_txn())?;
        for dbi_name in &index_dbi_names {
            let dbi = error::lmdb_result(txn.open_db(Some(dbi_name)))?;
            error::lmdb_result(unsafe { txn.drop_db(dbi) })?;
        }
        for key in &meta_keys {
            error::lmdb_result(txn.del(meta_dbi, key, None))?;
        }
        let main_dbi = error::lmdb_result(txn.open_db(Some(name)))?;
        error::lmdb_result(unsafe { txn.drop_db(main_dbi) })?;
        error::lmdb_result(txn.commit())
    }
}

pub(crate) fn reject_if_readonly(is_write: bool) -> Result<()> {
    if is_write {
        Ok(())
    } else {
        Err(error::Error::new(
            Code::Einval,
            "mutation attempted on a read-only transaction".to_string(),
        ))
    }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
