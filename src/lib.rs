//! Package implement the storage backend for an embedded directory
//! database. Directory entries are addressed by distinguished-names,
//! each entry carrying a set of typed multi-valued attributes, and
//! persisted into a single-file key,value store that support atomic
//! transactions.
//!
//! The backend translate logical directory operations - add, modify,
//! delete, rename, search-by-dn, sequence-number - into key,value reads
//! and writes. Refer to [Backend] type to get started.
//!
//! Components:
//!
//! * _[dn]_, distinguished-name parsing, casefolding and the primary
//!   record-key encoding.
//! * _[entry]_, entry/element data-model and the record codec. Entries
//!   are packed in [CBOR][cbor] format.
//! * _[schema]_, per-attribute syntax descriptors, comparison and
//!   canonical forms, kept in a sorted registry.
//! * _[store]_, single-file key,value store with nested transactions.
//! * _[cache]_, loader for the schema affecting special records,
//!   `@BASEINFO`, `@ATTRIBUTES` and `@INDEXLIST`.
//! * _[index]_, attribute-level inverted index, kept consistent with
//!   the primary records across every mutation.
//! * _[backend]_, the mutation engine, request dispatcher and
//!   sequence-number tracking.
//!
//! [cbor]: https://en.wikipedia.org/wiki/CBOR

use std::{fmt, result};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    FailCbor(String, String),
    InvalidFile(String, String),
    InvalidInput(String, String),
    OperationsError(String, String),
    ProtocolError(String, String),
    Busy(String, String),
    TimeLimitExceeded(String, String),
    EntryAlreadyExists(String, String),
    NoSuchObject(String, String),
    NoSuchAttribute(String, String),
    AttributeOrValueExists(String, String),
    InvalidAttributeSyntax(String, String),
    InsufficientAccess(String, String),
    UnsupportedCriticalExtension(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            FailCbor(p, msg) => write!(f, "{} FailCbor: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            OperationsError(p, msg) => write!(f, "{} OperationsError: {}", p, msg),
            ProtocolError(p, msg) => write!(f, "{} ProtocolError: {}", p, msg),
            Busy(p, msg) => write!(f, "{} Busy: {}", p, msg),
            TimeLimitExceeded(p, msg) => {
                write!(f, "{} TimeLimitExceeded: {}", p, msg)
            }
            EntryAlreadyExists(p, msg) => {
                write!(f, "{} EntryAlreadyExists: {}", p, msg)
            }
            NoSuchObject(p, msg) => write!(f, "{} NoSuchObject: {}", p, msg),
            NoSuchAttribute(p, msg) => write!(f, "{} NoSuchAttribute: {}", p, msg),
            AttributeOrValueExists(p, msg) => {
                write!(f, "{} AttributeOrValueExists: {}", p, msg)
            }
            InvalidAttributeSyntax(p, msg) => {
                write!(f, "{} InvalidAttributeSyntax: {}", p, msg)
            }
            InsufficientAccess(p, msg) => {
                write!(f, "{} InsufficientAccess: {}", p, msg)
            }
            UnsupportedCriticalExtension(p, msg) => {
                write!(f, "{} UnsupportedCriticalExtension: {}", p, msg)
            }
        }
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("at {}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("at {}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("at {}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod backend;
pub mod cache;
pub mod dn;
pub mod entry;
pub mod index;
pub mod schema;
pub mod store;
mod util;

pub use crate::backend::{Backend, Control, Handle, Op, Request, SeqType};
pub use crate::dn::{Dn, Rdn};
pub use crate::entry::{Element, Entry};
pub use crate::schema::{AttrSchema, Schema, Syntax};
pub use crate::store::{Config, SetFlag, Store};
