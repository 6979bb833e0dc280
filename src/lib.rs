pub mod applier;
pub mod batch;
pub mod errors;
pub mod executor;
pub mod last_write;
pub mod sharding;
pub mod storage;
pub mod write_concern;
pub mod write_scope;

// Re-export key types and structs for easier access
pub use applier::{ItemApplier, RetryPolicy};
pub use batch::request::{
    BatchRequest, DeleteLimit, DeleteSpec, Document, Namespace, RequestMetadata, UpdateSpec,
    WriteItem,
};
pub use batch::response::{
    BatchResponse, UpsertDetail, WcErrorDetail, WriteErrorDetail, WriteErrorInfo,
};
pub use batch::stats::WriteStats;
pub use errors::{StoreError, StoreResult, WriteErrorKind};
pub use executor::{BatchExecutor, OpCounters};
pub use last_write::LastWriteState;
pub use sharding::guard::{PartitionVersionGuard, VersionCheck};
pub use sharding::refresh::{ChannelRefresher, MetadataRefresher, NoopRefresher, RefreshRequest};
pub use sharding::state::{CollectionPartitioning, ShardingRuntime};
pub use sharding::version::PartitionVersion;
pub use storage::{
    DocumentStore, IndexOutcome, JournalEntry, OpTime, OperationJournal, UpdateOutcome,
};
pub use write_concern::{
    AckLevel, DurabilityTracker, LocalDurabilityTracker, WaitStatus, WriteConcernOptions,
    WriteConcernParseError, WriteConcernWaiter,
};
pub use write_scope::{CollectionLocks, WriteScope};

// Define the BatchType enum here as it's a core part of the public API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The operation type shared by every item of one batch.
///
/// A batch is uniform: all of its items are inserts, all updates, or all
/// deletes, against one target collection. The type decides which storage
/// primitive each item is routed to and which response fields are
/// populated (`n_modified` is reported for update batches only).
pub enum BatchType {
    /// Insert new documents. Inserts into the reserved `system.indexes`
    /// collection are index-creation requests and are validated against
    /// the target collection's partition key pattern.
    Insert,
    /// Update documents matching a query, optionally as an upsert that
    /// creates a new document when nothing matches.
    Update,
    /// Delete documents matching a query, either the first match or all
    /// matches.
    Delete,
}
