//! Secondary index engine (C8): attach/detach/populate/verify, and the
//! per-mutation protocol invoked by the transaction shell.

use std::sync::Arc;

use lmdb::{Cursor, RwTransaction, Transaction};

use crate::{
    error::{self, Code, Error, Result},
    extractor::Extractor,
    metadata::{self, IndexMeta},
    tree::{CompareFn, Tree},
};

/// Configuration accepted by [Tree::add_index].
pub struct IndexConfig {
    pub name: String,
    pub extractor_id: u64,
    pub extractor: Arc<dyn Extractor>,
    pub user_data: Vec<u8>,
    pub user_data_cleanup: Option<Arc<dyn Fn(&[u8]) + Send + Sync>>,
    pub unique: bool,
    pub sparse: bool,
    pub compare: Option<Arc<CompareFn>>,
    pub persistence: bool,
}

impl IndexConfig {
    pub fn new<E>(name: &str, extractor_id: u64, extractor: E) -> IndexConfig
    where
        E: Extractor + 'static,
    {
        IndexConfig {
            name: name.to_string(),
            extractor_id,
            extractor: Arc::new(extractor),
            user_data: Vec::new(),
            user_data_cleanup: None,
            unique: false,
            sparse: false,
            compare: None,
            persistence: true,
        }
    }

    pub fn set_user_data(mut self, user_data: Vec<u8>) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn set_user_data_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.user_data_cleanup = Some(Arc::new(cleanup));
        self
    }

    pub fn set_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn set_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn set_compare<F>(mut self, compare: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        self.compare = Some(Arc::new(compare));
        self
    }

    pub fn set_persistence(mut self, persistence: bool) -> Self {
        self.persistence = persistence;
        self
    }

    fn flags_mask(&self) -> u32 {
        let mut mask = 0;
        if self.unique {
            mask |= crate::extractor::FLAG_UNIQUE;
        }
        if self.sparse {
            mask |= crate::extractor::FLAG_SPARSE;
        }
        mask
    }
}

/// In-memory descriptor for an attached secondary index.
pub struct IndexDescriptor {
    pub name: String,
    pub(crate) dbi: lmdb::Database,
    pub extractor_id: u64,
    pub(crate) extractor: Arc<dyn Extractor>,
    pub unique: bool,
    pub sparse: bool,
    pub user_data: Vec<u8>,
    cleanup: Option<Arc<dyn Fn(&[u8]) + Send + Sync>>,
}

impl IndexDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        dbi: lmdb::Database,
        extractor_id: u64,
        extractor: Arc<dyn Extractor>,
        unique: bool,
        sparse: bool,
        user_data: Vec<u8>,
        cleanup: Option<Arc<dyn Fn(&[u8]) + Send + Sync>>,
    ) -> IndexDescriptor {
        IndexDescriptor {
            name,
            dbi,
            extractor_id,
            extractor,
            unique,
            sparse,
            user_data,
            cleanup,
        }
    }

    /// Invoke the registered user-data cleanup hook exactly once. Called by
    /// [Tree::close] and [drop_index] as each descriptor is removed from
    /// the tree's in-memory list.
    pub(crate) fn run_cleanup(self) {
        if let Some(cleanup) = &self.cleanup {
            cleanup(&self.user_data);
        }
    }

    fn extract(&self, value: &[u8]) -> (bool, Vec<u8>) {
        self.extractor.extract(value, &self.user_data)
    }
}

/// `add_index(tree, config)` (§4.8): reject duplicates, create the
/// physical sub-map, persist metadata (rolling back the sub-map on
/// failure), register the extractor for future reattachment, and append
/// the descriptor.
pub fn add_index(tree: &Tree, config: IndexConfig) -> Result<()> {
    if tree.indexes_snapshot().iter().any(|n| n == &config.name) {
        return Err(Error::new(
            Code::KeyExists,
            format!("index {:?} already attached to tree {:?}", config.name, tree.name()),
        ));
    }

    let physical_name = metadata::index_physical_name(tree.name(), &config.name);
    let dbi = tree.store().open_or_create_dbi(&physical_name, !config.unique)?;

    if config.persistence {
        let meta = IndexMeta {
            extractor_id: config.extractor_id,
            unique: config.unique,
            sparse: config.sparse,
            user_data: config.user_data.clone(),
        };
        if let Err(err) = save_index_metadata(tree, &config.name, &meta) {
            // roll back: drop the sub-map we just created.
            let _ = tree.store().drop_dbi(dbi);
            return Err(err);
        }
    }

    tree.store()
        .register_arc_extractor(config.extractor_id, config.flags_mask(), Arc::clone(&config.extractor));

    let descriptor = IndexDescriptor::new(
        config.name,
        dbi,
        config.extractor_id,
        config.extractor,
        config.unique,
        config.sparse,
        config.user_data,
        config.user_data_cleanup,
    );
    tree.indexes.write().push(descriptor);
    Ok(())
}

/// `populate_index(tree, name)`: scan the primary tree within a write
/// transaction, extracting and inserting index entries, honoring the
/// unique constraint.
pub fn populate_index(tree: &Tree, name: &str) -> Result<()> {
    let mut txn = error::lmdb_result(tree.store().env().begin_rw_txn())?;

    let (index_dbi, unique) = {
        let guard = tree.indexes.read();
        let descriptor = find_descriptor(&guard, name)?;
        (descriptor.dbi, descriptor.unique)
    };

    let entries: Vec<(Vec<u8>, Vec<u8>)> = {
        let mut cursor = error::lmdb_result(txn.open_ro_cursor(tree.dbi()))?;
        let mut out = Vec::new();
        for item in cursor.iter() {
            let (k, v) = error::lmdb_result(item)?;
            out.push((k.to_vec(), v.to_vec()));
        }
        out
    };

    for (k, v) in entries {
        let (ok, ik) = {
            let guard = tree.indexes.read();
            let descriptor = find_descriptor(&guard, name)?;
            descriptor.extract(&v)
        };
        if !ok {
            continue;
        }
        if unique {
            if let Some(existing) = get_opt(&txn, index_dbi, &ik)? {
                if existing != k {
                    return Err(Error::new(
                        Code::KeyExists,
                        format!("duplicate index key for unique index {:?}", name),
                    ));
                }
            }
        }
        error::lmdb_result(txn.put(index_dbi, &ik, &k, lmdb::WriteFlags::empty()))?;
    }

    error::lmdb_result(txn.commit())
}

/// `drop_index(tree, name)`: drop the physical sub-map, delete the
/// metadata record, remove the descriptor (running its cleanup hook).
pub fn drop_index(tree: &Tree, name: &str) -> Result<()> {
    let descriptor = {
        let mut guard = tree.indexes.write();
        let pos = guard
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| not_found(name))?;
        guard.remove(pos)
    };

    tree.store().drop_dbi(descriptor.dbi)?;

    let meta_dbi = tree.store().meta_dbi()?;
    let key = metadata::meta_key(tree.name(), name);
    let txn = error::lmdb_result(tree.store().env().begin_rw_txn())?;
    match txn.del(meta_dbi, &key, None) {
        Ok(()) | Err(lmdb::Error::NotFound) => {}
        Err(err) => return Err(error::from_lmdb(err)),
    }
    error::lmdb_result(txn.commit())?;

    descriptor.run_cleanup();
    Ok(())
}

/// `index_seek(tree, name, index_key)`: every primary key filed under
/// `index_key` in the named index, ascending. Non-unique indexes store
/// one duplicate per primary key under LMDB's own DUPSORT ordering, so
/// a plain duplicate walk already yields them in order; unique indexes
/// hold at most one.
pub fn index_seek(tree: &Tree, name: &str, index_key: &[u8]) -> Result<Vec<Vec<u8>>> {
    let (dbi, unique) = {
        let guard = tree.indexes.read();
        let descriptor = find_descriptor(&guard, name)?;
        (descriptor.dbi, descriptor.unique)
    };
    let txn = error::lmdb_result(tree.store().env().begin_ro_txn())?;

    if unique {
        return Ok(get_opt(&txn, dbi, index_key)?.into_iter().collect());
    }

    let mut cursor = error::lmdb_result(txn.open_ro_cursor(dbi))?;
    let mut out = Vec::new();
    for item in cursor.iter_dup_of(index_key) {
        let (_ik, pk) = error::lmdb_result(item)?;
        out.push(pk.to_vec());
    }
    Ok(out)
}

/// Two-phase consistency walk (§4.8 "Verify"), in a single read transaction.
pub fn verify_indexes(tree: &Tree) -> Result<()> {
    log::debug!("verify_indexes({:?}): phase 1 (primary -> indexes) starting", tree.name());
    let txn = error::lmdb_result(tree.store().env().begin_ro_txn())?;

    {
        let mut cursor = error::lmdb_result(txn.open_ro_cursor(tree.dbi()))?;
        for item in cursor.iter() {
            let (k, v) = error::lmdb_result(item)?;
            let guard = tree.indexes.read();
            for descriptor in guard.iter() {
                let (ok, ik) = descriptor.extract(v);
                if !ok && descriptor.sparse {
                    continue;
                }
                if !ok {
                    continue;
                }
                let found = any_dup_matches(&txn, descriptor.dbi, &ik, k)?;
                if !found {
                    return Err(Error::new(
                        Code::IndexError,
                        format!(
                            "index {:?}: missing entry for primary key {:?}",
                            descriptor.name, k
                        ),
                    ));
                }
            }
        }
    }

    log::debug!("verify_indexes({:?}): phase 2 (indexes -> primary) starting", tree.name());
    {
        let guard = tree.indexes.read();
        for descriptor in guard.iter() {
            let mut cursor = error::lmdb_result(txn.open_ro_cursor(descriptor.dbi))?;
            let mut last_key: Option<Vec<u8>> = None;
            for item in cursor.iter() {
                let (ik, pk) = error::lmdb_result(item)?;
                if txn.get(tree.dbi(), &pk).is_err() {
                    return Err(Error::new(
                        Code::IndexError,
                        format!(
                            "index {:?}: dangling reference to missing primary key {:?}",
                            descriptor.name, pk
                        ),
                    ));
                }
                if descriptor.unique {
                    match &last_key {
                        Some(prev) if prev == ik => {
                            return Err(Error::new(
                                Code::IndexError,
                                format!(
                                    "unique index {:?}: duplicate index key {:?}",
                                    descriptor.name, ik
                                ),
                            ));
                        }
                        _ => last_key = Some(ik.to_vec()),
                    }
                }
            }
        }
    }
    log::debug!("verify_indexes({:?}): complete", tree.name());
    Ok(())
}

/// Per-mutation insert: extract for each attached index, honor unique
/// constraints, write index entries, then the primary entry.
pub(crate) fn mutate_insert(tree: &Tree, txn: &mut RwTransaction, key: &[u8], value: &[u8]) -> Result<()> {
    let guard = tree.indexes.read();
    for descriptor in guard.iter() {
        let (ok, ik) = descriptor.extract(value);
        if !ok {
            continue;
        }
        if descriptor.unique {
            if let Some(existing) = get_opt(txn, descriptor.dbi, &ik)? {
                if existing != key {
                    return Err(Error::new(
                        Code::KeyExists,
                        format!("duplicate index key on index {:?}", descriptor.name),
                    ));
                }
            }
        }
        error::lmdb_result(txn.put(descriptor.dbi, &ik, &key, lmdb::WriteFlags::empty()))?;
    }
    drop(guard);
    error::lmdb_result(txn.put(tree.dbi(), &key, &value, lmdb::WriteFlags::empty()))
}

/// Per-mutation delete. Returns `false` (touching no indexes) if the
/// primary key was absent.
pub(crate) fn mutate_delete(tree: &Tree, txn: &mut RwTransaction, key: &[u8]) -> Result<bool> {
    let value = match get_opt(txn, tree.dbi(), key)? {
        Some(v) => v,
        None => return Ok(false),
    };

    let guard = tree.indexes.read();
    for descriptor in guard.iter() {
        let (ok, ik) = descriptor.extract(&value);
        if !ok {
            continue;
        }
        if descriptor.unique {
            match txn.del(descriptor.dbi, &ik, None) {
                Ok(()) | Err(lmdb::Error::NotFound) => {}
                Err(err) => return Err(error::from_lmdb(err)),
            }
        } else {
            match txn.del(descriptor.dbi, &ik, Some(key)) {
                Ok(()) | Err(lmdb::Error::NotFound) => {}
                Err(err) => return Err(error::from_lmdb(err)),
            }
        }
    }
    drop(guard);

    error::lmdb_result(txn.del(tree.dbi(), &key, None))?;
    Ok(true)
}

/// Per-mutation update: recompute old/new index keys, skip unchanged
/// indexes, otherwise remove the old entry and insert the new one.
pub(crate) fn mutate_update(tree: &Tree, txn: &mut RwTransaction, key: &[u8], new_value: &[u8]) -> Result<()> {
    let old_value = get_opt(txn, tree.dbi(), key)?;

    let guard = tree.indexes.read();
    for descriptor in guard.iter() {
        let (new_ok, new_ik) = descriptor.extract(new_value);
        let (old_ok, old_ik) = match &old_value {
            Some(v) => descriptor.extract(v),
            None => (false, Vec::new()),
        };

        if old_ok && new_ok && old_ik == new_ik {
            continue;
        }

        if old_ok {
            let data = if descriptor.unique { None } else { Some(key) };
            match txn.del(descriptor.dbi, &old_ik, data) {
                Ok(()) | Err(lmdb::Error::NotFound) => {}
                Err(err) => return Err(error::from_lmdb(err)),
            }
        }
        if new_ok {
            if descriptor.unique {
                if let Some(existing) = get_opt(txn, descriptor.dbi, &new_ik)? {
                    if existing != key {
                        return Err(Error::new(
                            Code::KeyExists,
                            format!("duplicate index key on index {:?}", descriptor.name),
                        ));
                    }
                }
            }
            error::lmdb_result(txn.put(descriptor.dbi, &new_ik, &key, lmdb::WriteFlags::empty()))?;
        }
    }
    drop(guard);

    error::lmdb_result(txn.put(tree.dbi(), &key, &new_value, lmdb::WriteFlags::empty()))
}

fn save_index_metadata(tree: &Tree, name: &str, meta: &IndexMeta) -> Result<()> {
    let meta_dbi = tree.store().meta_dbi()?;
    let key = metadata::meta_key(tree.name(), name);
    let txn = error::lmdb_result(tree.store().env().begin_rw_txn())?;
    error::lmdb_result(txn.put(meta_dbi, &key, &meta.encode(), lmdb::WriteFlags::empty()))?;
    error::lmdb_result(txn.commit())
}

fn find_descriptor<'a>(indexes: &'a [IndexDescriptor], name: &str) -> Result<&'a IndexDescriptor> {
    indexes.iter().find(|d| d.name == name).ok_or_else(|| not_found(name))
}

fn not_found(name: &str) -> Error {
    Error::new(Code::NotFound, format!("no such index {:?}", name))
}

/// `txn.get` translated to `Option`, treating `NotFound` as `None`.
fn get_opt<T: Transaction>(txn: &T, dbi: lmdb::Database, key: &[u8]) -> Result<Option<Vec<u8>>> {
    match txn.get(dbi, &key) {
        Ok(bytes) => Ok(Some(bytes.to_vec())),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(err) => Err(error::from_lmdb(err)),
    }
}

/// Whether a DUPSORT index at `dbi` has an entry `ik -> needle` among its
/// duplicates for `ik` (used by unique-index-agnostic verification, so it
/// also works for the single-valued unique case).
fn any_dup_matches<T: Transaction>(txn: &T, dbi: lmdb::Database, ik: &[u8], needle: &[u8]) -> Result<bool> {
    if let Some(existing) = get_opt(txn, dbi, ik)? {
        if existing == needle {
            return Ok(true);
        }
    }
    let mut cursor = error::lmdb_result(txn.open_ro_cursor(dbi))?;
    for item in cursor.iter_dup_of(ik) {
        let (_k, v) = error::lmdb_result(item)?;
        if v == needle {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
