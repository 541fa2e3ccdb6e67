use super::*;
use crate::store::{Store, StoreConfig};
use crate::tree::{Tree, TreeOpenOptions};

fn open_tree(name: &str) -> (tempfile::TempDir, Tree) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path())).unwrap();
    let tree = Tree::open(&store, name, TreeOpenOptions::new()).unwrap();
    (dir, tree)
}

#[test]
fn test_put_get_delete_roundtrip() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();
    txn.put(b"a", b"1").unwrap();
    assert_eq!(txn.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert!(txn.delete(b"a").unwrap());
    assert_eq!(txn.get(b"a").unwrap(), None);
    assert!(!txn.delete(b"a").unwrap());
    txn.commit().unwrap();
}

#[test]
fn test_mutation_rejected_on_readonly_txn() {
    let (_dir, tree) = open_tree("kv");
    {
        let mut txn = tree.begin_write().unwrap();
        txn.put(b"a", b"1").unwrap();
        txn.commit().unwrap();
    }
    let mut txn = tree.begin_read().unwrap();
    let err = txn.put(b"b", b"2").unwrap_err();
    assert_eq!(err.code.as_public(), crate::error::Code::Einval);
}

#[test]
fn test_get_many_and_exists_many() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();
    txn.put(b"a", b"1").unwrap();
    txn.put(b"c", b"3").unwrap();
    txn.commit().unwrap();

    let txn = tree.begin_read().unwrap();
    let keys: Vec<&[u8]> = vec![b"a", b"b", b"c"];
    let got = txn.get_many(&keys).unwrap();
    assert_eq!(got, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);
    assert_eq!(txn.exists_many(&keys).unwrap(), vec![true, false, true]);
}

#[test]
fn test_scan_range_and_prefix() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();
    for key in ["a1", "a2", "b1", "c1"] {
        txn.put(key.as_bytes(), b"v").unwrap();
    }
    txn.commit().unwrap();

    let txn = tree.begin_read().unwrap();
    let mut seen = Vec::new();
    txn.scan_range(Some(b"a2"), Some(b"c1"), |k, _v| {
        seen.push(String::from_utf8(k.to_vec()).unwrap());
        true
    })
    .unwrap();
    assert_eq!(seen, vec!["a2", "b1", "c1"]);

    let mut prefixed = Vec::new();
    txn.scan_prefix(b"a", |k, _v| {
        prefixed.push(String::from_utf8(k.to_vec()).unwrap());
        true
    })
    .unwrap();
    assert_eq!(prefixed, vec!["a1", "a2"]);
}

#[test]
fn test_scan_reverse_visits_in_descending_order() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();
    for key in ["a", "b", "c"] {
        txn.put(key.as_bytes(), b"v").unwrap();
    }
    txn.commit().unwrap();

    let txn = tree.begin_read().unwrap();
    let mut seen = Vec::new();
    txn.scan_reverse(None, None, |k, _v| {
        seen.push(String::from_utf8(k.to_vec()).unwrap());
        true
    })
    .unwrap();
    assert_eq!(seen, vec!["c", "b", "a"]);
}

#[test]
fn test_delete_if_removes_matching_entries() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();
    for key in ["a", "b", "c", "d"] {
        txn.put(key.as_bytes(), b"v").unwrap();
    }
    let deleted = txn
        .delete_if(None, None, |k, _v| k == b"b" || k == b"d")
        .unwrap();
    assert_eq!(deleted, 2);
    txn.commit().unwrap();

    let txn = tree.begin_read().unwrap();
    assert_eq!(txn.get(b"b").unwrap(), None);
    assert_eq!(txn.get(b"d").unwrap(), None);
    assert_eq!(txn.get(b"a").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_collect_range_respects_max_count() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();
    for key in ["a", "b", "c", "d"] {
        txn.put(key.as_bytes(), b"v").unwrap();
    }
    txn.commit().unwrap();

    let txn = tree.begin_read().unwrap();
    let (keys, values) = txn.collect_range(None, None, None, 2).unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(values.len(), 2);
}

#[test]
fn test_modify_inserts_updates_and_deletes() {
    let (_dir, tree) = open_tree("kv");
    let mut txn = tree.begin_write().unwrap();

    txn.modify(b"k", |existing| {
        assert!(existing.is_none());
        Some(b"v1".to_vec())
    })
    .unwrap();
    assert_eq!(txn.get(b"k").unwrap(), Some(b"v1".to_vec()));

    txn.modify(b"k", |existing| {
        assert_eq!(existing, Some(&b"v1"[..]));
        Some(b"v2".to_vec())
    })
    .unwrap();
    assert_eq!(txn.get(b"k").unwrap(), Some(b"v2".to_vec()));

    txn.modify(b"k", |_existing| None).unwrap();
    assert_eq!(txn.get(b"k").unwrap(), None);

    txn.commit().unwrap();
}
