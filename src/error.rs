//! Crate-wide error type and the `err_at!` construction macro.
//!
//! Every fallible call-site in this crate routes through [Error], using
//! the `err_at!` macro the same way the rest of the crate's ancestry does:
//! `err_at!(Code, fallible_expr)` to wrap a foreign `Result`, or
//! `err_at!(Code, msg: "...", args)` to construct one directly.

use std::{fmt, result};

/// Broad origin of an [Error], mirrors the `LIB`/`OS`/`STORE` split of the
/// error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Misuse or internal invariant violation inside this crate.
    Lib,
    /// A syscall or OS-mediated facility (threads, files, mmap) failed.
    Os,
    /// Translated from the underlying ordered map (LMDB).
    Store,
}

/// Stable numeric taxonomy, per the external-interfaces contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Code {
    Einval = 1,
    Enomem = 2,
    NotFound = 3,
    KeyExists = 4,
    IndexError = 5,
    TxnAborted = 6,
    Io = 7,
    Generic = 8,

    // Internal construction codes, collapsed to a public code + category
    // by `category()` / `as_public()` below. Kept distinct so call-sites
    // read the same way the teacher's `err_at!(ThreadFail, ...)`,
    // `err_at!(IPCFail, ...)` do.
    ThreadFail = 9,
    IpcFail = 10,
    DecodeFail = 11,
    Fatal = 12,
}

impl Code {
    /// Default category for a code, when the call-site does not override it.
    pub fn category(&self) -> Category {
        match self {
            Code::Einval => Category::Lib,
            Code::Enomem => Category::Os,
            Code::NotFound => Category::Lib,
            Code::KeyExists => Category::Lib,
            Code::IndexError => Category::Lib,
            Code::TxnAborted => Category::Store,
            Code::Io => Category::Os,
            Code::Generic => Category::Lib,
            Code::ThreadFail => Category::Os,
            Code::IpcFail => Category::Os,
            Code::DecodeFail => Category::Lib,
            Code::Fatal => Category::Lib,
        }
    }

    /// Collapse internal plumbing codes to the public numeric taxonomy of
    /// the external-interfaces contract.
    pub fn as_public(&self) -> Code {
        match self {
            Code::ThreadFail | Code::IpcFail => Code::Io,
            Code::DecodeFail | Code::Fatal => Code::Generic,
            other => *other,
        }
    }

    /// Numeric value of the public taxonomy (`OK=0` is not representable
    /// here since [Error] values are only ever constructed on failure).
    pub fn as_u32(&self) -> u32 {
        self.as_public() as u32
    }
}

/// Crate-wide error envelope: numeric code, category, free-form message.
pub struct Error {
    pub code: Code,
    pub category: Category,
    pub message: String,
}

impl Error {
    pub fn new(code: Code, message: String) -> Error {
        Error {
            category: code.category(),
            code,
            message,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}({}) {}",
            self.category,
            self.code.as_public(),
            self.code.as_u32(),
            self.message
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Translate an `lmdb::Error` into our taxonomy. The single mapping table
/// promised by §7 ("Store ... translated through a single mapping table
/// from the underlying map's codes").
pub fn from_lmdb(err: lmdb::Error) -> Error {
    use lmdb::Error as L;

    let code = match err {
        L::NotFound => Code::NotFound,
        L::KeyExist => Code::KeyExists,
        L::MapFull | L::TxnFull | L::DbsFull | L::ReadersFull => Code::Enomem,
        L::Invalid | L::BadValSize | L::BadDbi | L::Incompatible => Code::Einval,
        L::Panic => Code::Fatal,
        _ => Code::Generic,
    };
    Error::new(code, format!("lmdb: {}", err))
}

/// Translate a raw `lmdb::Result` into ours in one step; the call-site
/// shorthand used everywhere this crate touches the `lmdb` crate directly.
pub fn lmdb_result<T>(r: result::Result<T, lmdb::Error>) -> Result<T> {
    r.map_err(from_lmdb)
}

#[macro_export]
macro_rules! err_at {
    ($code:ident, msg: $($arg:expr),+ $(,)?) => {{
        Err::<_, $crate::error::Error>(
            $crate::error::Error::new($crate::error::Code::$code, format!($($arg),+))
        )
    }};
    ($code:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::error::Error::new(
                $crate::error::Code::$code,
                format!("{}:{} {}", file!(), line!(), err),
            )),
        }
    }};
}

#[cfg(test)]
mod error_test {
    use super::*;

    #[test]
    fn test_public_code_collapses() {
        assert_eq!(Code::ThreadFail.as_public(), Code::Io);
        assert_eq!(Code::Fatal.as_public(), Code::Generic);
        assert_eq!(Code::Einval.as_public(), Code::Einval);
    }

    #[test]
    fn test_err_at_wraps_foreign_result() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = err_at!(Io, res).unwrap_err();
        assert_eq!(err.code.as_public(), Code::Io);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn test_err_at_msg_form() {
        let err = err_at!(IndexError, msg: "dup key {}", 42).unwrap_err();
        assert_eq!(err.code.as_public(), Code::IndexError);
        assert!(err.message.contains("42"));
    }
}
