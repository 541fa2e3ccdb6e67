//! Transaction shell (C7) and bulk/scan primitives (C10).
//!
//! A [Txn] wraps either a read or a write transaction borrowed from the
//! tree's store, tying its lifetime to `&'t Tree` so no self-referential
//! struct or lifetime transmutation is needed: the `Store`'s `lmdb::Environment`
//! lives inside an `Arc` that outlives every `Tree` clone borrowed from it.

use lmdb::{Cursor, Transaction};

use crate::{
    error::{self, Result},
    index,
    tree::{reject_if_readonly, Tree},
};

enum Inner<'t> {
    Ro(lmdb::RoTransaction<'t>),
    Rw(lmdb::RwTransaction<'t>),
}

/// An active transaction against one [Tree].
pub struct Txn<'t> {
    tree: &'t Tree,
    inner: Inner<'t>,
}

impl Tree {
    pub fn begin_read(&self) -> Result<Txn<'_>> {
        let txn = error::lmdb_result(self.store().env().begin_ro_txn())?;
        Ok(Txn {
            tree: self,
            inner: Inner::Ro(txn),
        })
    }

    pub fn begin_write(&self) -> Result<Txn<'_>> {
        let txn = error::lmdb_result(self.store().env().begin_rw_txn())?;
        Ok(Txn {
            tree: self,
            inner: Inner::Rw(txn),
        })
    }
}

impl<'t> Txn<'t> {
    pub fn is_write(&self) -> bool {
        matches!(self.inner, Inner::Rw(_))
    }

    pub fn commit(self) -> Result<()> {
        match self.inner {
            Inner::Ro(txn) => error::lmdb_result(txn.commit()),
            Inner::Rw(txn) => error::lmdb_result(txn.commit()),
        }
    }

    pub fn abort(self) {
        match self.inner {
            Inner::Ro(txn) => txn.abort(),
            Inner::Rw(txn) => txn.abort(),
        }
    }

    fn rw(&mut self) -> Result<&mut lmdb::RwTransaction<'t>> {
        match &mut self.inner {
            Inner::Rw(txn) => Ok(txn),
            Inner::Ro(_) => reject_if_readonly(false).map(|_| unreachable!()),
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        reject_if_readonly(self.is_write())?;
        let tree = self.tree;
        index::mutate_insert(tree, self.rw()?, key, value)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        reject_if_readonly(self.is_write())?;
        let tree = self.tree;
        index::mutate_delete(tree, self.rw()?, key)
    }

    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        reject_if_readonly(self.is_write())?;
        let tree = self.tree;
        index::mutate_update(tree, self.rw()?, key, value)
    }

    /// `merge(key, value)`: resolves with the tree's merge function
    /// (defaulting to overwrite) against the current value, if any.
    pub fn merge(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        reject_if_readonly(self.is_write())?;
        let existing = self.get(key)?;
        let resolved = self.tree.merge(existing.as_deref(), value);
        let tree = self.tree;
        index::mutate_update(tree, self.rw()?, key, &resolved)
    }

    /// `modify(key, f)`: `f(existing) -> new`; `None -> None` is a no-op,
    /// `None -> Some` inserts, `Some -> Some` updates, `Some -> None` deletes.
    pub fn modify<F>(&mut self, key: &[u8], f: F) -> Result<()>
    where
        F: FnOnce(Option<&[u8]>) -> Option<Vec<u8>>,
    {
        reject_if_readonly(self.is_write())?;
        let existing = self.get(key)?;
        match (existing.as_deref(), f(existing.as_deref())) {
            (None, None) => Ok(()),
            (_, Some(new_value)) => {
                let tree = self.tree;
                index::mutate_update(tree, self.rw()?, key, &new_value)
            }
            (Some(_), None) => {
                let tree = self.tree;
                index::mutate_delete(tree, self.rw()?, key).map(|_| ())
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let result = match &self.inner {
            Inner::Ro(txn) => txn.get(self.tree.dbi(), &key),
            Inner::Rw(txn) => txn.get(self.tree.dbi(), &key),
        };
        match result {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(err) => Err(error::from_lmdb(err)),
        }
    }

    pub fn get_many(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    pub fn exists_many(&self, keys: &[&[u8]]) -> Result<Vec<bool>> {
        Ok(self.get_many(keys)?.into_iter().map(|v| v.is_some()).collect())
    }

    /// Inclusive `[start, end]` forward scan; `None` bounds are open.
    /// Calls `cb(key, value) -> continue`, stopping early when it returns
    /// `false` or the cursor crosses `end`.
    pub fn scan_range<F>(&self, start: Option<&[u8]>, end: Option<&[u8]>, mut cb: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let dbi = self.tree.dbi();
        let iter_items: Vec<lmdb::Result<(&[u8], &[u8])>> = match &self.inner {
            Inner::Ro(txn) => {
                let mut cursor = error::lmdb_result(txn.open_ro_cursor(dbi))?;
                collect_cursor(&mut cursor, start)
            }
            Inner::Rw(txn) => {
                let mut cursor = error::lmdb_result(txn.open_ro_cursor(dbi))?;
                collect_cursor(&mut cursor, start)
            }
        };

        for item in iter_items {
            let (k, v) = error::lmdb_result(item)?;
            if let Some(end) = end {
                if k > end {
                    break;
                }
            }
            if !cb(k, v) {
                break;
            }
        }
        Ok(())
    }

    /// Reverse of [Txn::scan_range]. Positions logically at the greatest
    /// key `<= start` (or the last key, when `start` is `None`) and walks
    /// backward. Implemented by buffering the forward range and iterating
    /// it in reverse (see DESIGN.md for why this trades streaming memory
    /// for avoiding undocumented low-level cursor positioning calls).
    pub fn scan_reverse<F>(&self, start: Option<&[u8]>, end: Option<&[u8]>, mut cb: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut buffered = Vec::new();
        self.scan_range(end, start, |k, v| {
            buffered.push((k.to_vec(), v.to_vec()));
            true
        })?;
        for (k, v) in buffered.into_iter().rev() {
            if !cb(&k, &v) {
                break;
            }
        }
        Ok(())
    }

    /// Scan every key with the given `prefix`, stopping at the first key
    /// that no longer starts with it.
    pub fn scan_prefix<F>(&self, prefix: &[u8], mut cb: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan_range(Some(prefix), None, |k, v| {
            if !crate::util::has_prefix(k, prefix) {
                return false;
            }
            cb(k, v)
        })
    }

    /// Delete every entry in `[start, end]` matching `predicate`, routing
    /// each deletion through the index-maintaining path. Returns the count
    /// deleted.
    pub fn delete_if<F>(&mut self, start: Option<&[u8]>, end: Option<&[u8]>, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        reject_if_readonly(self.is_write())?;

        // keys/values must be copied out before deleting: cursor_del
        // invalidates the bytes the cursor currently points to.
        let mut to_delete = Vec::new();
        self.scan_range(start, end, |k, v| {
            if predicate(k, v) {
                to_delete.push(k.to_vec());
            }
            true
        })?;

        let tree = self.tree;
        let txn = self.rw()?;
        let mut count = 0;
        for key in &to_delete {
            if index::mutate_delete(tree, txn, key)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Collect up to `max_count` `(key, value)` pairs in `[start, end]`
    /// matching an optional `predicate`.
    pub fn collect_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        predicate: Option<&dyn Fn(&[u8], &[u8]) -> bool>,
        max_count: usize,
    ) -> Result<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        self.scan_range(start, end, |k, v| {
            if predicate.map(|p| p(k, v)).unwrap_or(true) {
                keys.push(k.to_vec());
                values.push(v.to_vec());
            }
            keys.len() < max_count || max_count == 0
        })?;
        Ok((keys, values))
    }
}

fn collect_cursor<'txn, C: Cursor<'txn>>(
    cursor: &mut C,
    start: Option<&[u8]>,
) -> Vec<lmdb::Result<(&'txn [u8], &'txn [u8])>> {
    match start {
        Some(start) => cursor.iter_from(start).collect(),
        None => cursor.iter_start().collect(),
    }
}

#[cfg(test)]
#[path = "txn_test.rs"]
mod txn_test;
