use crossbeam_channel as channel;
use log::debug;

use crate::sharding::version::PartitionVersion;

/// A request to re-fetch one collection's partition map, with the
/// version the stale batch claimed as a hint for how far ahead the
/// authoritative map must at least be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub namespace: String,
    pub hint: PartitionVersion,
}

/// Handle through which the batch engine triggers partition-map
/// refreshes. The refresh protocol itself (remote metadata source,
/// transport) is owned externally; the engine only signals that a
/// collection's cached map was observed stale.
pub trait MetadataRefresher: Send + Sync {
    /// Requests an asynchronous refresh. Must not block the caller on
    /// the remote metadata source.
    fn request_refresh(&self, request: RefreshRequest);
}

/// A refresher that forwards requests over a channel to the externally
/// owned refresh routine. Send failures mean the consumer is gone and
/// are logged, not propagated; a missed refresh only delays map
/// convergence for future batches.
pub struct ChannelRefresher {
    sender: channel::Sender<RefreshRequest>,
}

impl ChannelRefresher {
    /// Creates the refresher and the receiving end for the refresh
    /// routine.
    pub fn new() -> (Self, channel::Receiver<RefreshRequest>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl MetadataRefresher for ChannelRefresher {
    fn request_refresh(&self, request: RefreshRequest) {
        debug!(
            "requesting partition map refresh for {} (hint {})",
            request.namespace, request.hint
        );
        if self.sender.send(request).is_err() {
            debug!("refresh consumer is gone, dropping refresh request");
        }
    }
}

/// A refresher for unsharded deployments and tests that need none.
#[derive(Debug, Default)]
pub struct NoopRefresher;

impl MetadataRefresher for NoopRefresher {
    fn request_refresh(&self, _request: RefreshRequest) {}
}
