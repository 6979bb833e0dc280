//! Partition-map state, version checks, and the refresh trigger.

pub mod guard;
pub mod refresh;
pub mod state;
pub mod version;
