use crate::batch::request::Document;
use crate::storage::OpTime;

/// Per-connection record of the most recent write, reset before each
/// item. Callers issuing a follow-up "what did my last write do" query
/// read from here; the batch response's `last_op` is taken from it as
/// well.
#[derive(Debug, Clone, Default)]
pub struct LastWriteState {
    last_op: Option<OpTime>,
    n_objects: u64,
    updated_existing: Option<bool>,
    upserted_id: Option<Document>,
}

impl LastWriteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-item fields. The last journaled optime survives
    /// the reset; it spans the whole connection.
    pub fn reset(&mut self) {
        self.n_objects = 0;
        self.updated_existing = None;
        self.upserted_id = None;
    }

    pub fn record_insert(&mut self, op: OpTime) {
        self.n_objects = 1;
        self.last_op = Some(op);
    }

    pub fn record_update(
        &mut self,
        updated_existing: bool,
        matched: u64,
        upserted_id: Option<Document>,
        op: Option<OpTime>,
    ) {
        self.n_objects = matched;
        self.updated_existing = Some(updated_existing);
        self.upserted_id = upserted_id;
        if let Some(op) = op {
            self.last_op = Some(op);
        }
    }

    pub fn record_delete(&mut self, n: u64, op: Option<OpTime>) {
        self.n_objects = n;
        if let Some(op) = op {
            self.last_op = Some(op);
        }
    }

    pub fn last_op(&self) -> Option<OpTime> {
        self.last_op
    }

    pub fn n_objects(&self) -> u64 {
        self.n_objects
    }

    pub fn updated_existing(&self) -> Option<bool> {
        self.updated_existing
    }

    pub fn upserted_id(&self) -> Option<&Document> {
        self.upserted_id.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reset_keeps_last_op() {
        let mut state = LastWriteState::new();
        state.record_insert(OpTime(3));
        state.reset();
        assert_eq!(state.last_op(), Some(OpTime(3)));
        assert_eq!(state.n_objects(), 0);
    }

    #[test]
    fn update_records_upserted_id() {
        let mut state = LastWriteState::new();
        state.record_update(false, 0, Some(json!(42)), Some(OpTime(7)));
        assert_eq!(state.upserted_id(), Some(&json!(42)));
        assert_eq!(state.updated_existing(), Some(false));
        assert_eq!(state.last_op(), Some(OpTime(7)));
    }
}
