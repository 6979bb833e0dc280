use std::sync::Arc;

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::batch::request::Document;
use crate::sharding::refresh::{MetadataRefresher, NoopRefresher, RefreshRequest};
use crate::sharding::version::PartitionVersion;

/// The locally cached partition metadata of one collection.
#[derive(Debug, Clone)]
pub struct CollectionPartitioning {
    pub version: PartitionVersion,
    /// The fields documents are partitioned by, e.g. `{"user_id": 1}`.
    pub key_pattern: Document,
}

impl CollectionPartitioning {
    pub fn new(version: PartitionVersion, key_pattern: Document) -> Self {
        Self {
            version,
            key_pattern,
        }
    }

    /// Whether a unique index with this key pattern can exist on the
    /// partitioned collection. Uniqueness can only be enforced within
    /// one partition, so the index must cover every partition-key field;
    /// an index on `_id` alone is always allowed.
    pub fn allows_unique_index(&self, index_pattern: &Document) -> bool {
        let index_fields: Vec<&String> = match index_pattern.as_object() {
            Some(fields) => fields.keys().collect(),
            None => return false,
        };
        if index_fields.len() == 1 && index_fields[0] == "_id" {
            return true;
        }
        match self.key_pattern.as_object() {
            Some(key_fields) => key_fields
                .keys()
                .all(|field| index_pattern.get(field).is_some()),
            None => false,
        }
    }
}

/// The process-wide sharding context: shard identity, the read-mostly
/// partition-map cache, and the refresh handle.
///
/// Every batch's version guard reads the cache; only the externally
/// owned refresh routine writes it (through [`install_partitioning`]).
/// The guard never blocks on a refresh it did not trigger itself:
/// staleness detected mid-batch is corrected for future batches only.
///
/// [`install_partitioning`]: ShardingRuntime::install_partitioning
pub struct ShardingRuntime {
    enabled: bool,
    shard_name: Mutex<Option<String>>,
    cache: RwLock<HashMap<String, CollectionPartitioning>>,
    refresher: Arc<dyn MetadataRefresher>,
}

impl ShardingRuntime {
    /// Creates the runtime for a node that is part of a partitioned
    /// deployment.
    pub fn new(refresher: Arc<dyn MetadataRefresher>) -> Self {
        Self {
            enabled: true,
            shard_name: Mutex::new(None),
            cache: RwLock::new(HashMap::new()),
            refresher,
        }
    }

    /// Creates the runtime for a standalone node. Version checks are
    /// skipped entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            shard_name: Mutex::new(None),
            cache: RwLock::new(HashMap::new()),
            refresher: Arc::new(NoopRefresher),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Sets the shard name on first use and verifies it afterwards.
    /// Returns false when a different name was set previously; the
    /// caller must then treat its routing metadata as untrustworthy and
    /// skip the refresh.
    pub fn set_shard_name(&self, name: &str) -> bool {
        let mut shard_name = self.shard_name.lock();
        match shard_name.as_deref() {
            None => {
                debug!("setting shard name to {name}");
                *shard_name = Some(name.to_string());
                true
            }
            Some(current) => current == name,
        }
    }

    pub fn shard_name(&self) -> Option<String> {
        self.shard_name.lock().clone()
    }

    /// The cached partition metadata of a collection, if it is
    /// partitioned.
    pub fn collection_partitioning(&self, namespace: &str) -> Option<CollectionPartitioning> {
        self.cache.read().get(namespace).cloned()
    }

    /// The cached partition version of a collection;
    /// [`PartitionVersion::UNPARTITIONED`] when there is no entry.
    pub fn collection_version(&self, namespace: &str) -> PartitionVersion {
        self.cache
            .read()
            .get(namespace)
            .map(|p| p.version)
            .unwrap_or(PartitionVersion::UNPARTITIONED)
    }

    /// Installs refreshed partition metadata. Called by the refresh
    /// routine (and tests), never by batch execution.
    pub fn install_partitioning(&self, namespace: &str, partitioning: CollectionPartitioning) {
        self.cache
            .write()
            .insert(namespace.to_string(), partitioning);
    }

    /// Triggers an asynchronous partition-map refresh for a collection.
    pub fn request_refresh(&self, namespace: &str, hint: PartitionVersion) {
        self.refresher.request_refresh(RefreshRequest {
            namespace: namespace.to_string(),
            hint,
        });
    }
}
