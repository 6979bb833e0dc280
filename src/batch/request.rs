use serde::{Deserialize, Serialize};

use crate::BatchType;
use crate::sharding::version::PartitionVersion;

/// The namespace of a collection, `"database.collection"`. Using String
/// for now.
pub type Namespace = String;

/// A schemaless document. JSON values stand in for the store's native
/// encoding, which is owned by the storage layer.
pub type Document = serde_json::Value;

/// The reserved collection name for index-creation inserts.
pub const INDEXES_COLLECTION: &str = "system.indexes";

/// One update specification within an update batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSpec {
    /// The query selecting the documents to update.
    pub query: Document,
    /// The update expression applied to each matched document.
    pub update: Document,
    /// Update every matched document instead of only the first.
    pub multi: bool,
    /// Insert a new document when nothing matches the query.
    pub upsert: bool,
}

/// How many matched documents a delete item removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteLimit {
    /// Remove only the first matched document.
    One,
    /// Remove every matched document.
    All,
}

/// One delete specification within a delete batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSpec {
    /// The query selecting the documents to delete.
    pub query: Document,
    /// How many matched documents to remove.
    pub limit: DeleteLimit,
}

/// A single write within a batch, addressed by its position. Immutable
/// once constructed; the position is the stable identity used in error
/// and upsert reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WriteItem {
    Insert(Document),
    Update(UpdateSpec),
    Delete(DeleteSpec),
}

impl WriteItem {
    fn batch_type(&self) -> BatchType {
        match self {
            WriteItem::Insert(_) => BatchType::Insert,
            WriteItem::Update(_) => BatchType::Update,
            WriteItem::Delete(_) => BatchType::Delete,
        }
    }
}

/// Sharding metadata attached to a routed request: the shard the router
/// believes it is talking to and the partition version it routed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub shard_name: String,
    pub claimed_version: PartitionVersion,
}

/// One client batch of write operations against a single collection.
///
/// A `BatchRequest` is read-only input for the duration of one execution.
/// The per-type constructors guarantee the batch invariant that every
/// item shares one operation type; mixing item kinds is unrepresentable
/// through them.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    batch_type: BatchType,
    namespace: Namespace,
    items: Vec<WriteItem>,
    ordered: bool,
    write_concern: Option<Document>,
    verbose: bool,
    metadata: Option<RequestMetadata>,
}

impl BatchRequest {
    fn new(batch_type: BatchType, namespace: impl Into<Namespace>, items: Vec<WriteItem>) -> Self {
        debug_assert!(items.iter().all(|i| i.batch_type() == batch_type));
        Self {
            batch_type,
            namespace: namespace.into(),
            items,
            ordered: true,
            write_concern: None,
            verbose: true,
            metadata: None,
        }
    }

    /// Creates an insert batch.
    pub fn insert(namespace: impl Into<Namespace>, documents: Vec<Document>) -> Self {
        let items = documents.into_iter().map(WriteItem::Insert).collect();
        Self::new(BatchType::Insert, namespace, items)
    }

    /// Creates an update batch.
    pub fn update(namespace: impl Into<Namespace>, updates: Vec<UpdateSpec>) -> Self {
        let items = updates.into_iter().map(WriteItem::Update).collect();
        Self::new(BatchType::Update, namespace, items)
    }

    /// Creates a delete batch.
    pub fn delete(namespace: impl Into<Namespace>, deletes: Vec<DeleteSpec>) -> Self {
        let items = deletes.into_iter().map(WriteItem::Delete).collect();
        Self::new(BatchType::Delete, namespace, items)
    }

    /// Sets the execution policy: an ordered batch stops at the first
    /// item failure, an unordered one attempts every item.
    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    /// Attaches a write concern spec, overriding the process default.
    /// The spec is parsed after the batch loop; a malformed one becomes
    /// the response's write-concern error.
    pub fn with_write_concern(mut self, spec: Document) -> Self {
        self.write_concern = Some(spec);
        self
    }

    /// Controls observability only: a non-verbose response carries no
    /// per-item errors, upsert details, or counts, but ordered stops and
    /// staleness handling are unchanged.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Attaches routing metadata from the sharding layer.
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn items(&self) -> &[WriteItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn write_concern(&self) -> Option<&Document> {
        self.write_concern.as_ref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn metadata(&self) -> Option<&RequestMetadata> {
        self.metadata.as_ref()
    }

    /// Whether this insert batch creates indexes rather than documents.
    pub fn is_index_request(&self) -> bool {
        self.batch_type == BatchType::Insert && collection_of(&self.namespace) == INDEXES_COLLECTION
    }

    /// The namespace version checks and refreshes target. For index
    /// requests this is the collection named inside the index spec, not
    /// the reserved indexes collection itself.
    pub fn target_namespace(&self) -> &str {
        if self.is_index_request() {
            if let Some(WriteItem::Insert(doc)) = self.items.first() {
                if let Some(ns) = doc.get("ns").and_then(|v| v.as_str()) {
                    return ns;
                }
            }
        }
        &self.namespace
    }
}

/// The collection part of a `"database.collection"` namespace.
pub fn collection_of(namespace: &str) -> &str {
    match namespace.split_once('.') {
        Some((_, collection)) => collection,
        None => namespace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_produce_uniform_batches() {
        let batch = BatchRequest::insert("db.users", vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(batch.batch_type(), BatchType::Insert);
        assert_eq!(batch.len(), 2);
        assert!(batch.ordered());
        assert!(batch.verbose());
    }

    #[test]
    fn index_request_targets_inner_namespace() {
        let batch = BatchRequest::insert(
            "db.system.indexes",
            vec![json!({"ns": "db.users", "key": {"user_id": 1}, "unique": true})],
        );
        assert!(batch.is_index_request());
        assert_eq!(batch.target_namespace(), "db.users");

        let plain = BatchRequest::insert("db.users", vec![json!({"a": 1})]);
        assert!(!plain.is_index_request());
        assert_eq!(plain.target_namespace(), "db.users");
    }

    #[test]
    fn collection_part_of_namespace() {
        assert_eq!(collection_of("db.users"), "users");
        assert_eq!(collection_of("db.system.indexes"), "system.indexes");
        assert_eq!(collection_of("bare"), "bare");
    }
}
