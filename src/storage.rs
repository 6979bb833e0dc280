use serde::{Deserialize, Serialize};

use crate::batch::request::{DeleteLimit, Document, UpdateSpec};
use crate::errors::StoreResult;

/// A position in the durability log. Monotone per process; comparable so
/// the durability tracker can decide whether a reference point has been
/// acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpTime(pub u64);

/// The outcome of one update primitive.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Documents matched by the query.
    pub matched: u64,
    /// Documents actually changed by the update expression.
    pub modified: u64,
    /// The generated id when the update inserted a new document.
    pub upserted_id: Option<Document>,
}

/// The outcome of an index-creation primitive. An already-existing index
/// is success for the batch item, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    AlreadyExists,
}

/// The document mutation primitives the batch engine drives.
///
/// Implementations own document encoding, query matching, and index
/// maintenance; the engine only routes items to them and classifies
/// their failures. Every method may report a recoverable
/// [`StoreError::Transient`](crate::errors::StoreError::Transient) fault,
/// in which case it must not have mutated anything: the applier releases
/// the write scope and re-attempts the item from scratch.
///
/// Implementations must be `Send` and `Sync`; items of concurrent
/// batches interleave on them.
pub trait DocumentStore: Send + Sync {
    /// Creates the collection if it does not exist. Called before
    /// inserts so a missing target collection is not an item error.
    fn ensure_collection(&self, namespace: &str) -> StoreResult<()>;

    /// Inserts one document.
    fn insert_document(&self, namespace: &str, document: Document) -> StoreResult<()>;

    /// Applies one update spec and reports how many documents it
    /// matched and modified, plus the generated id if it upserted.
    fn update_documents(&self, namespace: &str, spec: &UpdateSpec) -> StoreResult<UpdateOutcome>;

    /// Deletes documents matching the query and reports how many.
    fn delete_documents(
        &self,
        namespace: &str,
        query: &Document,
        limit: DeleteLimit,
    ) -> StoreResult<u64>;

    /// Creates an index on the collection from its spec document.
    fn create_index(&self, namespace: &str, spec: &Document) -> StoreResult<IndexOutcome>;
}

/// One durability-log record for an applied mutation. Records are
/// appended in the order items succeed within a batch.
#[derive(Debug, Clone, Serialize)]
pub enum JournalEntry {
    Insert {
        namespace: String,
        document: Document,
    },
    Update {
        namespace: String,
        query: Document,
        update: Document,
    },
    Delete {
        namespace: String,
        query: Document,
    },
}

/// The durability-log writer. The replication machinery consuming the
/// log and acknowledging optimes is external to this crate.
pub trait OperationJournal: Send + Sync {
    /// Appends one record and returns its log position.
    fn append(&self, entry: JournalEntry) -> OpTime;
}
