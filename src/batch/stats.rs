/// Per-batch write counters, owned exclusively by one execution.
///
/// Counters are accumulated monotonically and never decremented. An
/// upsert counts toward `num_upserted` only; a plain update counts its
/// matched documents in `num_updated` and the subset actually changed in
/// `num_modified`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub num_inserted: u64,
    pub num_updated: u64,
    pub num_modified: u64,
    pub num_upserted: u64,
    pub num_deleted: u64,
}

impl WriteStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self) {
        self.num_inserted += 1;
    }

    pub fn record_update(&mut self, matched: u64, modified: u64) {
        self.num_updated += matched;
        self.num_modified += modified;
    }

    pub fn record_upsert(&mut self) {
        self.num_upserted += 1;
    }

    pub fn record_delete(&mut self, n: u64) {
        self.num_deleted += n;
    }

    /// Total successful writes, the response's `n`.
    pub fn total(&self) -> u64 {
        self.num_inserted + self.num_upserted + self.num_updated + self.num_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_does_not_count_as_update() {
        let mut stats = WriteStats::new();
        stats.record_upsert();
        stats.record_update(2, 1);
        assert_eq!(stats.num_upserted, 1);
        assert_eq!(stats.num_updated, 2);
        assert_eq!(stats.num_modified, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn total_sums_every_kind_except_modified() {
        let mut stats = WriteStats::new();
        stats.record_insert();
        stats.record_delete(3);
        stats.record_update(1, 1);
        assert_eq!(stats.total(), 5);
    }
}
