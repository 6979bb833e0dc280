use crate::batch::request::RequestMetadata;
use crate::sharding::state::ShardingRuntime;
use crate::sharding::version::PartitionVersion;

/// The verdict of one partition-version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    Ok,
    /// The claimed version is not write-compatible with the cached one.
    /// Both versions are carried for the item's error info.
    Stale {
        received: PartitionVersion,
        wanted: PartitionVersion,
    },
}

/// Compares a request's claimed partition version against the locally
/// cached partition map.
///
/// The check is a no-op when the node is not part of a partitioned
/// deployment, when the request carries no routing metadata, or when
/// the claimed version is the [`PartitionVersion::IGNORED`] sentinel.
/// It is performed while the item's write scope is held, so the cached
/// version cannot move between the check and the mutation.
pub struct PartitionVersionGuard<'a> {
    runtime: &'a ShardingRuntime,
}

impl<'a> PartitionVersionGuard<'a> {
    pub fn new(runtime: &'a ShardingRuntime) -> Self {
        Self { runtime }
    }

    pub fn check(&self, target_namespace: &str, metadata: Option<&RequestMetadata>) -> VersionCheck {
        if !self.runtime.enabled() {
            return VersionCheck::Ok;
        }
        let Some(metadata) = metadata else {
            return VersionCheck::Ok;
        };
        if metadata.claimed_version.is_ignored() {
            return VersionCheck::Ok;
        }

        let wanted = self.runtime.collection_version(target_namespace);
        if metadata.claimed_version.is_write_compatible_with(&wanted) {
            VersionCheck::Ok
        } else {
            VersionCheck::Stale {
                received: metadata.claimed_version,
                wanted,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::state::CollectionPartitioning;
    use serde_json::json;
    use std::sync::Arc;

    fn metadata(version: PartitionVersion) -> RequestMetadata {
        RequestMetadata {
            shard_name: "shard-a".to_string(),
            claimed_version: version,
        }
    }

    fn sharded_runtime() -> ShardingRuntime {
        let runtime = ShardingRuntime::new(Arc::new(crate::sharding::refresh::NoopRefresher));
        runtime.install_partitioning(
            "db.users",
            CollectionPartitioning::new(PartitionVersion::new(2, 4), json!({"user_id": 1})),
        );
        runtime
    }

    #[test]
    fn disabled_runtime_skips_check() {
        let runtime = ShardingRuntime::disabled();
        let guard = PartitionVersionGuard::new(&runtime);
        let meta = metadata(PartitionVersion::new(1, 1));
        assert_eq!(guard.check("db.users", Some(&meta)), VersionCheck::Ok);
    }

    #[test]
    fn missing_metadata_skips_check() {
        let runtime = sharded_runtime();
        let guard = PartitionVersionGuard::new(&runtime);
        assert_eq!(guard.check("db.users", None), VersionCheck::Ok);
    }

    #[test]
    fn ignored_sentinel_skips_check() {
        let runtime = sharded_runtime();
        let guard = PartitionVersionGuard::new(&runtime);
        let meta = metadata(PartitionVersion::IGNORED);
        assert_eq!(guard.check("db.users", Some(&meta)), VersionCheck::Ok);
    }

    #[test]
    fn stale_claim_reports_both_versions() {
        let runtime = sharded_runtime();
        let guard = PartitionVersionGuard::new(&runtime);
        let meta = metadata(PartitionVersion::new(2, 3));
        assert_eq!(
            guard.check("db.users", Some(&meta)),
            VersionCheck::Stale {
                received: PartitionVersion::new(2, 3),
                wanted: PartitionVersion::new(2, 4),
            }
        );
    }

    #[test]
    fn compatible_claim_passes() {
        let runtime = sharded_runtime();
        let guard = PartitionVersionGuard::new(&runtime);
        let meta = metadata(PartitionVersion::new(2, 4));
        assert_eq!(guard.check("db.users", Some(&meta)), VersionCheck::Ok);
    }
}
