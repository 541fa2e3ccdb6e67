use super::*;

fn first_byte(value: &[u8], _user_data: &[u8]) -> (bool, Vec<u8>) {
    match value.first() {
        Some(b) => (true, vec![*b]),
        None => (false, vec![]),
    }
}

#[test]
fn test_extractor_id_roundtrip() {
    let id = extractor_id(1, 7);
    assert_eq!(split_extractor_id(id), (1, 7));
    assert_eq!(id, (1_u64 << 32) | 7);
}

#[test]
fn test_registry_lookup_miss() {
    let reg = ExtractorRegistry::new();
    assert!(reg.lookup(extractor_id(1, 0)).is_none());
}

#[test]
fn test_registry_register_and_extract() {
    let mut reg = ExtractorRegistry::new();
    let id = extractor_id(1, 0);
    reg.register_key_extractor(id, FLAG_UNIQUE | FLAG_SPARSE, first_byte);

    let extractor = reg.lookup(id).expect("registered");
    assert_eq!(extractor.extract(b"Alice", b""), (true, vec![b'A']));
    assert_eq!(extractor.extract(b"", b""), (false, vec![]));
    assert!(reg.supports(id, FLAG_UNIQUE));
    assert!(!reg.supports(id, FLAG_UNIQUE | 0x4));
}
