use std::sync::Arc;

use log::debug;

use crate::batch::request::{BatchRequest, Document, UpdateSpec, WriteItem};
use crate::batch::response::{WriteErrorDetail, WriteErrorInfo};
use crate::batch::stats::WriteStats;
use crate::errors::{StoreError, WriteErrorKind};
use crate::last_write::LastWriteState;
use crate::sharding::guard::{PartitionVersionGuard, VersionCheck};
use crate::sharding::state::ShardingRuntime;
use crate::storage::{DocumentStore, IndexOutcome, JournalEntry, OperationJournal};
use crate::write_scope::CollectionLocks;

/// Bounds the transient-fault retry loop. The storage layer's
/// recoverable faults are normally retried until the missing resource
/// is available; tests and cautious deployments can cap the attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Unbounded,
    /// At most this many retries after the first attempt.
    Limited(u32),
}

impl RetryPolicy {
    fn allows_retry(&self, attempts_so_far: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Limited(max_retries) => attempts_so_far <= *max_retries,
        }
    }
}

/// The failure modes of one application attempt. Transient faults stay
/// inside the applier; only terminal details escape to the executor.
enum ApplyError {
    Transient(String),
    Terminal(WriteErrorDetail),
}

impl From<StoreError> for ApplyError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Transient(reason) => ApplyError::Transient(reason),
            StoreError::Failed { kind, message } => {
                ApplyError::Terminal(WriteErrorDetail::new(kind, message))
            }
        }
    }
}

type ApplyResult = Result<Option<Document>, ApplyError>;

/// Applies exactly one write item under an isolation scope, retrying on
/// transient storage faults.
///
/// Each attempt runs inside a fresh exclusive write acquisition on the
/// target collection, scoped to the single item. A transient fault
/// releases the scope and re-attempts the item from scratch; the
/// aborted attempt committed no side effects, so stats are never
/// double-counted. Any other failure is terminal for the item and
/// reported through the returned error detail.
pub struct ItemApplier {
    store: Arc<dyn DocumentStore>,
    journal: Arc<dyn OperationJournal>,
    sharding: Arc<ShardingRuntime>,
    locks: Arc<CollectionLocks>,
    retry_policy: RetryPolicy,
}

impl ItemApplier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        journal: Arc<dyn OperationJournal>,
        sharding: Arc<ShardingRuntime>,
        locks: Arc<CollectionLocks>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            journal,
            sharding,
            locks,
            retry_policy,
        }
    }

    /// Applies the item at `index`, feeding `stats` and the connection's
    /// last-write state on success. For updates that turned out to be
    /// upserts the generated id is returned.
    pub fn apply(
        &self,
        request: &BatchRequest,
        index: usize,
        stats: &mut WriteStats,
        last_write: &mut LastWriteState,
    ) -> Result<Option<Document>, WriteErrorDetail> {
        last_write.reset();

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let scope = self.locks.acquire(request.namespace());
            let result = self.apply_in_scope(request, index, stats, last_write);
            drop(scope);

            match result {
                Ok(upserted_id) => return Ok(upserted_id),
                Err(ApplyError::Terminal(detail)) => return Err(detail),
                Err(ApplyError::Transient(reason)) => {
                    if !self.retry_policy.allows_retry(attempts) {
                        return Err(WriteErrorDetail::new(
                            WriteErrorKind::InternalError,
                            format!("transient fault persisted after {attempts} attempts: {reason}"),
                        ));
                    }
                    // The missing resource is brought in outside the
                    // write scope; the next attempt starts from scratch.
                    debug!("transient fault on item {index}, retrying (attempt {attempts}): {reason}");
                }
            }
        }
    }

    fn apply_in_scope(
        &self,
        request: &BatchRequest,
        index: usize,
        stats: &mut WriteStats,
        last_write: &mut LastWriteState,
    ) -> ApplyResult {
        // Version check happens inside the write scope so the cached
        // version cannot move between the check and the mutation.
        let guard = PartitionVersionGuard::new(&self.sharding);
        if let VersionCheck::Stale { received, wanted } =
            guard.check(request.target_namespace(), request.metadata())
        {
            return Err(ApplyError::Terminal(stale_version_error(received, wanted)));
        }

        match &request.items()[index] {
            WriteItem::Insert(document) => {
                if request.is_index_request() {
                    self.apply_index_insert(request, document, stats, last_write)
                } else {
                    self.apply_insert(request.namespace(), document, stats, last_write)
                }
            }
            WriteItem::Update(spec) => {
                self.apply_update(request.namespace(), spec, stats, last_write)
            }
            WriteItem::Delete(spec) => {
                self.apply_delete(request.namespace(), spec, stats, last_write)
            }
        }
    }

    fn apply_insert(
        &self,
        namespace: &str,
        document: &Document,
        stats: &mut WriteStats,
        last_write: &mut LastWriteState,
    ) -> ApplyResult {
        validate_insert_document(document).map_err(ApplyError::Terminal)?;
        self.ensure_collection(namespace)?;
        self.store.insert_document(namespace, document.clone())?;

        let op = self.journal.append(JournalEntry::Insert {
            namespace: namespace.to_string(),
            document: document.clone(),
        });
        stats.record_insert();
        last_write.record_insert(op);
        Ok(None)
    }

    fn apply_index_insert(
        &self,
        request: &BatchRequest,
        spec: &Document,
        stats: &mut WriteStats,
        last_write: &mut LastWriteState,
    ) -> ApplyResult {
        let Some(target_ns) = spec.get("ns").and_then(|v| v.as_str()) else {
            return Err(ApplyError::Terminal(WriteErrorDetail::new(
                WriteErrorKind::BadValue,
                "tried to create an index without specifying namespace",
            )));
        };
        let Some(key_pattern) = spec.get("key").filter(|k| k.is_object()) else {
            return Err(ApplyError::Terminal(WriteErrorDetail::new(
                WriteErrorKind::BadValue,
                "index spec is missing a key pattern",
            )));
        };

        // Uniqueness can only hold within one partition, so a unique
        // index must cover the partition key.
        let unique = spec.get("unique").and_then(|v| v.as_bool()).unwrap_or(false);
        if unique {
            if let Some(partitioning) = self.sharding.collection_partitioning(target_ns) {
                if !partitioning.allows_unique_index(key_pattern) {
                    return Err(ApplyError::Terminal(WriteErrorDetail::new(
                        WriteErrorKind::CannotCreateIndex,
                        format!(
                            "cannot create unique index over {key_pattern} with partition key pattern {}",
                            partitioning.key_pattern
                        ),
                    )));
                }
            }
        }

        self.ensure_collection(target_ns)?;
        match self.store.create_index(target_ns, spec)? {
            IndexOutcome::AlreadyExists => Ok(None),
            IndexOutcome::Created => {
                let op = self.journal.append(JournalEntry::Insert {
                    namespace: request.namespace().to_string(),
                    document: spec.clone(),
                });
                stats.record_insert();
                last_write.record_insert(op);
                Ok(None)
            }
        }
    }

    fn apply_update(
        &self,
        namespace: &str,
        spec: &UpdateSpec,
        stats: &mut WriteStats,
        last_write: &mut LastWriteState,
    ) -> ApplyResult {
        let outcome = self.store.update_documents(namespace, spec)?;
        let did_insert = outcome.upserted_id.is_some();

        let op = if did_insert || outcome.modified > 0 {
            Some(self.journal.append(JournalEntry::Update {
                namespace: namespace.to_string(),
                query: spec.query.clone(),
                update: spec.update.clone(),
            }))
        } else {
            None
        };

        if did_insert {
            stats.record_upsert();
        } else {
            stats.record_update(outcome.matched, outcome.modified);
        }
        last_write.record_update(
            !did_insert && outcome.matched > 0,
            outcome.matched,
            outcome.upserted_id.clone(),
            op,
        );
        Ok(outcome.upserted_id)
    }

    fn apply_delete(
        &self,
        namespace: &str,
        spec: &crate::batch::request::DeleteSpec,
        stats: &mut WriteStats,
        last_write: &mut LastWriteState,
    ) -> ApplyResult {
        let n = self
            .store
            .delete_documents(namespace, &spec.query, spec.limit)?;

        let op = if n > 0 {
            Some(self.journal.append(JournalEntry::Delete {
                namespace: namespace.to_string(),
                query: spec.query.clone(),
            }))
        } else {
            None
        };

        stats.record_delete(n);
        last_write.record_delete(n, op);
        Ok(None)
    }

    /// Implicitly creates a missing target collection. A terminal
    /// failure here is the engine's problem, not the document's, so it
    /// is reported as an internal error.
    fn ensure_collection(&self, namespace: &str) -> Result<(), ApplyError> {
        self.store.ensure_collection(namespace).map_err(|error| match error {
            StoreError::Transient(reason) => ApplyError::Transient(reason),
            StoreError::Failed { message, .. } => ApplyError::Terminal(WriteErrorDetail::new(
                WriteErrorKind::InternalError,
                format!("could not create collection: {message}"),
            )),
        })
    }
}

fn stale_version_error(
    received: crate::sharding::version::PartitionVersion,
    wanted: crate::sharding::version::PartitionVersion,
) -> WriteErrorDetail {
    WriteErrorDetail::new(
        WriteErrorKind::StalePartitionVersion,
        format!(
            "stale partition version detected before write, received {received} but local version is {wanted}"
        ),
    )
    .with_info(WriteErrorInfo::StaleVersion { received, wanted })
}

fn validate_insert_document(document: &Document) -> Result<(), WriteErrorDetail> {
    let Some(fields) = document.as_object() else {
        return Err(WriteErrorDetail::new(
            WriteErrorKind::BadValue,
            "insert document must be an object",
        ));
    };
    for name in fields.keys() {
        if name.starts_with('$') {
            return Err(WriteErrorDetail::new(
                WriteErrorKind::BadValue,
                format!("top-level field name cannot start with '$': {name}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_document_must_be_object() {
        assert!(validate_insert_document(&json!({"a": 1})).is_ok());
        let err = validate_insert_document(&json!([1, 2])).unwrap_err();
        assert_eq!(err.kind, WriteErrorKind::BadValue);
    }

    #[test]
    fn dollar_fields_are_rejected() {
        let err = validate_insert_document(&json!({"$set": {"a": 1}})).unwrap_err();
        assert_eq!(err.kind, WriteErrorKind::BadValue);
        assert!(err.message.contains("$set"));
    }

    #[test]
    fn limited_retry_policy_exhausts() {
        let policy = RetryPolicy::Limited(1);
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(RetryPolicy::Unbounded.allows_retry(1000));
    }
}
