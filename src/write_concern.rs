use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::batch::request::Document;
use crate::batch::response::WcErrorDetail;
use crate::errors::WriteErrorKind;
use crate::storage::OpTime;

/// How many acknowledgments a write must collect before it is durable
/// enough for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckLevel {
    /// Acknowledged by this many nodes, the writer included. Zero means
    /// fire-and-forget: the wait is trivially satisfied.
    Nodes(u32),
    /// Acknowledged by a majority of the replica set.
    Majority,
    /// Acknowledged by nodes carrying this replication tag.
    Tag(String),
}

/// A parsed, validated write concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConcernOptions {
    pub ack: AckLevel,
    /// Also require the write to be journaled on acknowledging nodes.
    pub journal: bool,
    /// Give up after this long; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for WriteConcernOptions {
    fn default() -> Self {
        Self {
            ack: AckLevel::Nodes(1),
            journal: false,
            timeout: None,
        }
    }
}

/// A write concern spec that failed validation. Malformed specs are
/// synchronous errors; they are never waited on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteConcernParseError {
    #[error("write concern must be an object")]
    NotAnObject,
    #[error("invalid w value: {0}")]
    InvalidW(String),
    #[error("invalid j value: must be a boolean")]
    InvalidJournal,
    #[error("invalid wtimeout value: must be a non-negative number of milliseconds")]
    InvalidTimeout,
    #[error("unknown write concern field: {0}")]
    UnknownField(String),
}

impl WriteConcernOptions {
    /// Parses a raw spec document of the shape
    /// `{"w": 1 | "majority" | "<tag>", "j": bool, "wtimeout": millis}`.
    /// An empty object is the default concern.
    pub fn parse(spec: &Document) -> Result<Self, WriteConcernParseError> {
        let fields = spec
            .as_object()
            .ok_or(WriteConcernParseError::NotAnObject)?;

        let mut options = WriteConcernOptions::default();
        for (name, value) in fields {
            match name.as_str() {
                "w" => {
                    options.ack = if let Some(nodes) = value.as_u64() {
                        AckLevel::Nodes(nodes as u32)
                    } else {
                        match value.as_str() {
                            Some("majority") => AckLevel::Majority,
                            Some(tag) if !tag.is_empty() => AckLevel::Tag(tag.to_string()),
                            _ => return Err(WriteConcernParseError::InvalidW(value.to_string())),
                        }
                    };
                }
                "j" => {
                    options.journal = value
                        .as_bool()
                        .ok_or(WriteConcernParseError::InvalidJournal)?;
                }
                "wtimeout" => {
                    let millis = value
                        .as_u64()
                        .ok_or(WriteConcernParseError::InvalidTimeout)?;
                    if millis > 0 {
                        options.timeout = Some(Duration::from_millis(millis));
                    }
                }
                other => {
                    return Err(WriteConcernParseError::UnknownField(other.to_string()));
                }
            }
        }
        Ok(options)
    }
}

/// The outcome of one durability wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStatus {
    Satisfied,
    TimedOut,
    Failed {
        kind: WriteErrorKind,
        message: String,
    },
}

/// The acknowledgment channel the write-concern wait blocks on. The
/// replication machinery that observes acknowledged optimes and wakes
/// waiters implements this; the batch engine only asks whether a
/// reference point became durable in time.
pub trait DurabilityTracker: Send + Sync {
    /// Blocks until `reference` satisfies `options`, `options.timeout`
    /// elapses, or the wait fails outright.
    fn wait_until(&self, options: &WriteConcernOptions, reference: OpTime) -> WaitStatus;
}

/// Resolves, validates, and waits on the batch's write concern.
///
/// The requested spec wins over the process-wide default. Whatever the
/// outcome, the waiter never undoes applied writes; it only reports
/// whether the guarantee was observed.
pub struct WriteConcernWaiter {
    tracker: Arc<dyn DurabilityTracker>,
    default_spec: Document,
}

impl WriteConcernWaiter {
    pub fn new(tracker: Arc<dyn DurabilityTracker>, default_spec: Document) -> Self {
        Self {
            tracker,
            default_spec,
        }
    }

    /// Returns `None` when the guarantee was observed, or the error
    /// detail to report once per batch.
    pub fn wait(&self, requested: Option<&Document>, reference: OpTime) -> Option<WcErrorDetail> {
        let spec = requested.unwrap_or(&self.default_spec);
        let options = match WriteConcernOptions::parse(spec) {
            Ok(options) => options,
            Err(parse_error) => {
                return Some(WcErrorDetail {
                    kind: WriteErrorKind::BadValue,
                    message: parse_error.to_string(),
                    timed_out: false,
                });
            }
        };

        debug!("waiting for write concern {options:?} at {reference:?}");
        match self.tracker.wait_until(&options, reference) {
            WaitStatus::Satisfied => None,
            WaitStatus::TimedOut => Some(WcErrorDetail {
                kind: WriteErrorKind::WriteConcernFailed,
                message: "waiting for replication timed out".to_string(),
                timed_out: true,
            }),
            WaitStatus::Failed { kind, message } => Some(WcErrorDetail {
                kind,
                message,
                timed_out: false,
            }),
        }
    }
}

/// A single-node durability tracker.
///
/// The journal's durable point is advanced by whoever persists it (or
/// by tests); waiters block on a condvar until the point passes their
/// reference optime. Acknowledgment levels beyond the local node are
/// satisfied once the local durable point passes, since there are no
/// peers to wait for.
pub struct LocalDurabilityTracker {
    durable: Mutex<OpTime>,
    advanced: Condvar,
}

impl Default for LocalDurabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDurabilityTracker {
    pub fn new() -> Self {
        Self {
            durable: Mutex::new(OpTime::default()),
            advanced: Condvar::new(),
        }
    }

    /// Marks everything up to `op` durable and wakes waiters.
    pub fn advance_to(&self, op: OpTime) {
        let mut durable = self.durable.lock();
        if op > *durable {
            *durable = op;
            self.advanced.notify_all();
        }
    }

    pub fn durable_op(&self) -> OpTime {
        *self.durable.lock()
    }
}

impl DurabilityTracker for LocalDurabilityTracker {
    fn wait_until(&self, options: &WriteConcernOptions, reference: OpTime) -> WaitStatus {
        if options.ack == AckLevel::Nodes(0) {
            return WaitStatus::Satisfied;
        }

        let mut durable = self.durable.lock();
        match options.timeout {
            Some(timeout) => {
                let result =
                    self.advanced
                        .wait_while_for(&mut durable, |durable| *durable < reference, timeout);
                if result.timed_out() && *durable < reference {
                    WaitStatus::TimedOut
                } else {
                    WaitStatus::Satisfied
                }
            }
            None => {
                self.advanced
                    .wait_while(&mut durable, |durable| *durable < reference);
                WaitStatus::Satisfied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_default_fields() {
        let options = WriteConcernOptions::parse(&json!({})).unwrap();
        assert_eq!(options, WriteConcernOptions::default());
    }

    #[test]
    fn parse_numeric_and_majority_w() {
        let options = WriteConcernOptions::parse(&json!({"w": 3, "wtimeout": 250})).unwrap();
        assert_eq!(options.ack, AckLevel::Nodes(3));
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));

        let options = WriteConcernOptions::parse(&json!({"w": "majority", "j": true})).unwrap();
        assert_eq!(options.ack, AckLevel::Majority);
        assert!(options.journal);
    }

    #[test]
    fn parse_tag_w() {
        let options = WriteConcernOptions::parse(&json!({"w": "rack-1"})).unwrap();
        assert_eq!(options.ack, AckLevel::Tag("rack-1".to_string()));
    }

    #[test]
    fn parse_rejects_malformed_specs() {
        assert!(WriteConcernOptions::parse(&json!(5)).is_err());
        assert!(WriteConcernOptions::parse(&json!({"w": true})).is_err());
        assert!(WriteConcernOptions::parse(&json!({"j": 1})).is_err());
        assert!(WriteConcernOptions::parse(&json!({"wtimeout": -3})).is_err());
        assert!(WriteConcernOptions::parse(&json!({"fsync": true})).is_err());
    }

    #[test]
    fn local_tracker_satisfied_once_advanced() {
        let tracker = LocalDurabilityTracker::new();
        tracker.advance_to(OpTime(5));
        let options = WriteConcernOptions::default();
        assert_eq!(
            tracker.wait_until(&options, OpTime(5)),
            WaitStatus::Satisfied
        );
    }

    #[test]
    fn local_tracker_times_out() {
        let tracker = LocalDurabilityTracker::new();
        let options = WriteConcernOptions {
            timeout: Some(Duration::from_millis(10)),
            ..WriteConcernOptions::default()
        };
        assert_eq!(
            tracker.wait_until(&options, OpTime(1)),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn unacknowledged_wait_is_trivial() {
        let tracker = LocalDurabilityTracker::new();
        let options = WriteConcernOptions {
            ack: AckLevel::Nodes(0),
            ..WriteConcernOptions::default()
        };
        assert_eq!(
            tracker.wait_until(&options, OpTime(99)),
            WaitStatus::Satisfied
        );
    }
}
