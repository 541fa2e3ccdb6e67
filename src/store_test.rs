use super::*;

fn open_tmp_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path());
    let store = Store::open(config).unwrap();
    (dir, store)
}

#[test]
fn test_open_and_close() {
    let (_dir, store) = open_tmp_store();
    assert_eq!(store.config().max_trees, 64);
    store.close().unwrap();
}

#[test]
fn test_meta_dbi_is_idempotent() {
    let (_dir, store) = open_tmp_store();
    let a = store.meta_dbi().unwrap();
    let b = store.meta_dbi().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_extractor_registration_roundtrip() {
    let (_dir, store) = open_tmp_store();
    let id = crate::extractor::extractor_id(1, 0);
    store.register_key_extractor(id, crate::extractor::FLAG_UNIQUE, |v: &[u8], _: &[u8]| {
        (true, v.to_vec())
    });
    assert!(store.lookup_extractor(id).is_some());
    assert!(store.extractor_supports(id, crate::extractor::FLAG_UNIQUE));
}

#[test]
fn test_store_is_cheaply_cloneable() {
    let (_dir, store) = open_tmp_store();
    let clone = store.clone();
    let dbi_a = store.meta_dbi().unwrap();
    let dbi_b = clone.meta_dbi().unwrap();
    assert_eq!(dbi_a, dbi_b);
}
