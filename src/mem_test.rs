use super::*;
use std::ptr;

#[test]
fn test_mapinfo_reports_no_address() {
    let surface = MemSurface::new(4096);
    let info = surface.mapinfo();
    assert_eq!(info.addr, None);
    assert_eq!(info.size, 4096);
}

#[test]
fn test_advise_and_lock_are_noop_without_address() {
    let surface = MemSurface::new(4096);
    surface.advise(Advice::WillNeed).unwrap();
    surface.mlock(LockScope::Current).unwrap();
    surface.munlock().unwrap();
}

#[test]
fn test_prefetch_clamps_to_map_size() {
    let surface = MemSurface::new(100);
    // offset beyond the map: clamps to zero length and is a no-op.
    surface.prefetch(200, 50).unwrap();
    // overlapping range: clamps length, still a no-op (no address known).
    surface.prefetch(80, 50).unwrap();
}

#[test]
fn test_raw_advise_against_real_mapping() {
    let len = 4096;
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    assert_ne!(addr, libc::MAP_FAILED);

    raw_advise(addr, len, Advice::Sequential).unwrap();
    raw_advise(addr, len, Advice::DontNeed).unwrap();

    unsafe {
        libc::munmap(addr, len);
    }
}
