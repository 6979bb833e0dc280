use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Stable error kinds carried inside per-item and write-concern error
/// details.
///
/// These are the codes a client can dispatch on. Terminal storage-layer
/// failures that have no dedicated kind are surfaced verbatim through
/// [`WriteErrorKind::Storage`] with their native numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteErrorKind {
    /// A malformed item: a non-object insert document, a `$`-prefixed
    /// top-level field name, or an index spec without a target namespace.
    BadValue,
    /// The target collection could not be implicitly created.
    InternalError,
    /// The partition version claimed by the request is not
    /// write-compatible with the locally cached one. Carries both
    /// versions in the error info.
    StalePartitionVersion,
    /// A unique index whose key pattern is incompatible with the
    /// collection's partition key pattern.
    CannotCreateIndex,
    /// A uniqueness constraint rejected the document.
    DuplicateKey,
    /// The client connection was interrupted while the item was applying.
    Interrupted,
    /// The requested durability guarantee was not observed.
    WriteConcernFailed,
    /// Any other terminal storage-layer error, surfaced with its native
    /// code.
    Storage(u32),
}

impl WriteErrorKind {
    /// The numeric code reported on the wire.
    pub fn code(&self) -> u32 {
        match self {
            WriteErrorKind::BadValue => 2,
            WriteErrorKind::InternalError => 1,
            WriteErrorKind::StalePartitionVersion => 63,
            WriteErrorKind::CannotCreateIndex => 67,
            WriteErrorKind::DuplicateKey => 11000,
            WriteErrorKind::Interrupted => 11601,
            WriteErrorKind::WriteConcernFailed => 64,
            WriteErrorKind::Storage(code) => *code,
        }
    }
}

impl fmt::Display for WriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteErrorKind::BadValue => write!(f, "BadValue"),
            WriteErrorKind::InternalError => write!(f, "InternalError"),
            WriteErrorKind::StalePartitionVersion => write!(f, "StalePartitionVersion"),
            WriteErrorKind::CannotCreateIndex => write!(f, "CannotCreateIndex"),
            WriteErrorKind::DuplicateKey => write!(f, "DuplicateKey"),
            WriteErrorKind::Interrupted => write!(f, "Interrupted"),
            WriteErrorKind::WriteConcernFailed => write!(f, "WriteConcernFailed"),
            WriteErrorKind::Storage(code) => write!(f, "Storage({code})"),
        }
    }
}

/// A failure signalled by the storage layer for one primitive operation.
///
/// The two variants drive completely different control flow in the item
/// applier: transient faults are retried from scratch outside the write
/// scope and are invisible to the caller, terminal failures are reported
/// as the item's error and never retried.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// A recoverable fault, e.g. a data page that must be brought in
    /// outside the locked scope. The aborted attempt performed no
    /// partial mutation, so re-applying the item is safe.
    #[error("transient storage fault: {0}")]
    Transient(String),
    /// A terminal failure for the item. The kind and message are
    /// surfaced verbatim in the item's error detail.
    #[error("{kind}: {message}")]
    Failed {
        kind: WriteErrorKind,
        message: String,
    },
}

impl StoreError {
    /// Shorthand for a terminal failure.
    pub fn failed(kind: WriteErrorKind, message: impl Into<String>) -> Self {
        StoreError::Failed {
            kind,
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_kind_keeps_native_code() {
        assert_eq!(WriteErrorKind::Storage(9001).code(), 9001);
        assert_eq!(WriteErrorKind::DuplicateKey.code(), 11000);
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::failed(WriteErrorKind::BadValue, "no good");
        assert_eq!(err.to_string(), "BadValue: no good");
        let err = StoreError::Transient("page not resident".to_string());
        assert!(err.to_string().contains("transient"));
    }
}
