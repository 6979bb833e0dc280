use serde::Serialize;

use crate::batch::request::Document;
use crate::errors::WriteErrorKind;
use crate::sharding::version::PartitionVersion;
use crate::storage::OpTime;

/// Structured diagnostics attached to a per-item error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WriteErrorInfo {
    /// A stale-version failure always embeds both versions: the one the
    /// request claimed and the one the local cache wanted.
    StaleVersion {
        received: PartitionVersion,
        wanted: PartitionVersion,
    },
}

/// One failed item's error record.
///
/// The applier builds the detail without an index; the executor stamps
/// the item's position when it moves the detail into the response.
#[derive(Debug, Clone, Serialize)]
pub struct WriteErrorDetail {
    /// Position of the failed item in the batch.
    pub index: usize,
    pub kind: WriteErrorKind,
    pub message: String,
    pub info: Option<WriteErrorInfo>,
}

impl WriteErrorDetail {
    pub fn new(kind: WriteErrorKind, message: impl Into<String>) -> Self {
        Self {
            index: 0,
            kind,
            message: message.into(),
            info: None,
        }
    }

    pub fn with_info(mut self, info: WriteErrorInfo) -> Self {
        self.info = Some(info);
        self
    }
}

/// The batch's single durability error, independent of per-item errors.
#[derive(Debug, Clone, Serialize)]
pub struct WcErrorDetail {
    pub kind: WriteErrorKind,
    pub message: String,
    /// True when the durability wait gave up after the requested bound.
    pub timed_out: bool,
}

/// Reports the generated id of an update item that turned out to be an
/// upsert.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertDetail {
    /// Position of the upserting item in the batch.
    pub index: usize,
    /// The id generated for the inserted document.
    pub id: Document,
}

/// The aggregated outcome of one batch execution.
///
/// Built incrementally by the executor during the loop and finalized
/// once. `ok` is true even for a partially failed batch; failure is
/// conveyed through `errors` and `write_concern_error`, never through
/// the envelope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResponse {
    pub ok: bool,
    /// Total successes, present only for verbose requests.
    pub n: Option<u64>,
    /// Documents actually modified; update batches only, verbose only.
    pub n_modified: Option<u64>,
    /// Per-item errors in batch order, verbose only.
    pub errors: Vec<WriteErrorDetail>,
    /// Upserted ids in batch order, verbose only.
    pub upserted: Vec<UpsertDetail>,
    pub write_concern_error: Option<WcErrorDetail>,
    /// The durability-log position of the batch's last applied write.
    pub last_op: Option<OpTime>,
}

impl BatchResponse {
    /// Number of items reported as failed.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
