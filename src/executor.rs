use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::BatchType;
use crate::applier::{ItemApplier, RetryPolicy};
use crate::batch::request::{BatchRequest, Document};
use crate::batch::response::{BatchResponse, UpsertDetail};
use crate::batch::stats::WriteStats;
use crate::errors::WriteErrorKind;
use crate::last_write::LastWriteState;
use crate::sharding::state::ShardingRuntime;
use crate::storage::{DocumentStore, OperationJournal};
use crate::write_concern::{DurabilityTracker, WriteConcernWaiter};
use crate::write_scope::CollectionLocks;

/// Seshat Prelude
pub mod prelude {
    pub use crate::applier::*;
    pub use crate::batch::request::*;
    pub use crate::batch::response::*;
    pub use crate::batch::stats::*;
    pub use crate::errors::*;
    pub use crate::executor::*;
    pub use crate::sharding::guard::*;
    pub use crate::sharding::refresh::*;
    pub use crate::sharding::state::*;
    pub use crate::sharding::version::*;
    pub use crate::storage::*;
    pub use crate::write_concern::*;
    pub use crate::write_scope::*;
    pub use crate::*;
}

/// Process-wide tallies of attempted write operations, across batches.
#[derive(Debug, Default)]
pub struct OpCounters {
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl OpCounters {
    fn got(&self, batch_type: BatchType) {
        let counter = match batch_type {
            BatchType::Insert => &self.inserts,
            BatchType::Update => &self.updates,
            BatchType::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

/// The main entry point for Seshat batch-write execution.
///
/// One executor serves any number of batches; each call to
/// [`execute`](BatchExecutor::execute) runs one batch to completion on
/// the calling worker. The executor never returns an error: every
/// failure is represented inside the [`BatchResponse`].
pub struct BatchExecutor {
    store: Arc<dyn DocumentStore>,
    journal: Arc<dyn OperationJournal>,
    /// The process-wide sharding context, shared with the refresh
    /// routine that owns its cache updates.
    sharding: Arc<ShardingRuntime>,
    locks: Arc<CollectionLocks>,
    write_concern: WriteConcernWaiter,
    retry_policy: RetryPolicy,
    counters: OpCounters,
}

impl BatchExecutor {
    /// Creates a new executor.
    ///
    /// `default_write_concern` is the process-wide spec applied when a
    /// request carries none.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        journal: Arc<dyn OperationJournal>,
        tracker: Arc<dyn DurabilityTracker>,
        sharding: Arc<ShardingRuntime>,
        default_write_concern: Document,
    ) -> Self {
        Self {
            store,
            journal,
            sharding,
            locks: Arc::new(CollectionLocks::new()),
            write_concern: WriteConcernWaiter::new(tracker, default_write_concern),
            retry_policy: RetryPolicy::Unbounded,
            counters: OpCounters::default(),
        }
    }

    /// Caps the transient-fault retry loop; the default retries without
    /// bound.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn counters(&self) -> &OpCounters {
        &self.counters
    }

    /// Executes one batch and produces its aggregated response.
    ///
    /// Items are applied strictly in request order. An ordered batch
    /// stops at the first failure; an unordered one attempts every
    /// item. After the loop the requested durability guarantee is
    /// awaited if anything succeeded, and a stale-version observation
    /// triggers a partition-map refresh for future batches.
    pub fn execute(&self, request: &BatchRequest) -> BatchResponse {
        let mut response = BatchResponse::default();
        let mut stats = WriteStats::new();
        let mut last_write = LastWriteState::new();
        let verbose = request.verbose();

        let applier = ItemApplier::new(
            Arc::clone(&self.store),
            Arc::clone(&self.journal),
            Arc::clone(&self.sharding),
            Arc::clone(&self.locks),
            self.retry_policy,
        );

        let num_items = request.len();
        let mut item_errors = 0usize;
        let mut stale_batch = false;
        for index in 0..num_items {
            self.counters.got(request.batch_type());

            match applier.apply(request, index, &mut stats, &mut last_write) {
                Ok(upserted_id) => {
                    // Callers may want to learn which _id an upsert
                    // generated for this position.
                    if let Some(id) = upserted_id {
                        if verbose {
                            response.upserted.push(UpsertDetail { index, id });
                        }
                    }
                }
                Err(mut error) => {
                    if error.kind == WriteErrorKind::StalePartitionVersion {
                        stale_batch = true;
                    }
                    let interrupted = error.kind == WriteErrorKind::Interrupted;

                    // Don't bother recording if the caller doesn't want
                    // a verbose answer.
                    if verbose {
                        error.index = index;
                        response.errors.push(error);
                    }
                    item_errors += 1;

                    if request.ordered() {
                        debug!("ordered batch stopping after failure at index {index}");
                        break;
                    }
                    // A connection interrupt cancels the whole batch,
                    // ordered or not.
                    if interrupted {
                        debug!("batch interrupted at index {index}, stopping");
                        break;
                    }
                }
            }
        }

        if verbose {
            response.last_op = last_write.last_op();
        }

        // Apply write concern if we had any successful writes.
        if item_errors < num_items {
            let wc_error = self.write_concern.wait(
                request.write_concern(),
                last_write.last_op().unwrap_or_default(),
            );
            if verbose {
                response.write_concern_error = wc_error;
            }
        }

        if verbose {
            response.n = Some(stats.total());
            if request.batch_type() == BatchType::Update {
                response.n_modified = Some(stats.num_modified);
            }
        }

        if stale_batch {
            self.handle_stale_batch(request, item_errors);
        }

        // A partially-failed batch is still a well-formed response;
        // failure lives in the error fields, not the envelope.
        response.ok = true;
        response
    }

    /// Reacts to a stale-version observation once the loop is done:
    /// verify the shard identity the router claimed, then trigger an
    /// asynchronous partition-map refresh for the target collection.
    /// An identity mismatch is diagnostic only and skips the refresh.
    fn handle_stale_batch(&self, request: &BatchRequest, item_errors: usize) {
        let Some(metadata) = request.metadata() else {
            // The guard only reports staleness for requests carrying
            // metadata.
            return;
        };

        if !self.sharding.set_shard_name(&metadata.shard_name) {
            // Staleness was observed, so at least one item failed. An
            // ordered batch may have stopped before attempting the rest.
            debug_assert!(item_errors > 0);
            warn!(
                "shard name {} in batch does not match previously-set shard name {}, \
                 not refreshing partition map",
                metadata.shard_name,
                self.sharding.shard_name().unwrap_or_default()
            );
        } else {
            self.sharding
                .request_refresh(request.target_namespace(), metadata.claimed_version);
        }
    }
}
