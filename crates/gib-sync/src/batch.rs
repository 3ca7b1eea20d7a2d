//! Record batching between extraction and the store

use crate::models::RegistryRecord;

/// Default number of records per store write
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Buffers records in arrival order until a threshold is reached
#[derive(Debug)]
pub struct BatchAccumulator {
    threshold: usize,
    buffer: Vec<RegistryRecord>,
}

impl BatchAccumulator {
    /// A threshold of zero is treated as one
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            buffer: Vec::with_capacity(threshold.min(DEFAULT_BATCH_SIZE)),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn add(&mut self, record: RegistryRecord) {
        self.buffer.push(record);
    }

    /// Hand over the buffered records once the threshold is reached
    pub fn flush_if_full(&mut self) -> Option<Vec<RegistryRecord>> {
        (self.buffer.len() >= self.threshold).then(|| self.take())
    }

    /// Put back records whose write failed, ahead of anything added since
    pub fn restore(&mut self, mut records: Vec<RegistryRecord>) {
        records.append(&mut self.buffer);
        self.buffer = records;
    }

    /// Hand over whatever is left, possibly nothing
    pub fn flush_remainder(&mut self) -> Vec<RegistryRecord> {
        self.take()
    }

    fn take(&mut self) -> Vec<RegistryRecord> {
        std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.threshold.min(DEFAULT_BATCH_SIZE)),
        )
    }
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, Role};
    use chrono::{NaiveDate, Utc};

    fn record(n: usize) -> RegistryRecord {
        let now = Utc::now();
        RegistryRecord {
            identifier: format!("{n:010}"),
            alias: format!("urn:mail:{n}@example.com"),
            title: None,
            role: Role::Pk,
            document_type: DocumentType::Invoice,
            first_creation_time: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            is_active: true,
            created_at: now,
            last_synced_at: now,
        }
    }

    #[test]
    fn test_flushes_exactly_at_threshold() {
        let mut acc = BatchAccumulator::new(3);

        for n in 0..2 {
            acc.add(record(n));
            assert!(acc.flush_if_full().is_none());
        }
        acc.add(record(2));

        let batch = acc.flush_if_full().unwrap();
        assert_eq!(batch.len(), 3);
        assert!(acc.is_empty());
        assert!(acc.flush_if_full().is_none());
    }

    #[test]
    fn test_preserves_arrival_order() {
        let mut acc = BatchAccumulator::new(10);
        (0..4).for_each(|n| acc.add(record(n)));

        let ids: Vec<_> = acc.flush_remainder().into_iter().map(|r| r.identifier).collect();
        assert_eq!(ids, vec!["0000000000", "0000000001", "0000000002", "0000000003"]);
    }

    #[test]
    fn test_remainder_is_below_threshold() {
        let mut acc = BatchAccumulator::new(4);
        let mut flushed = Vec::new();
        for n in 0..10 {
            acc.add(record(n));
            if let Some(batch) = acc.flush_if_full() {
                flushed.push(batch.len());
            }
        }

        assert_eq!(flushed, vec![4, 4]);
        assert_eq!(acc.flush_remainder().len(), 2);
        assert!(acc.flush_remainder().is_empty());
    }

    #[test]
    fn test_restored_records_come_first() {
        let mut acc = BatchAccumulator::new(2);
        acc.add(record(0));
        acc.add(record(1));
        let failed = acc.flush_if_full().unwrap();

        acc.add(record(2));
        acc.restore(failed);

        let ids: Vec<_> = acc.flush_remainder().into_iter().map(|r| r.identifier).collect();
        assert_eq!(ids, vec!["0000000000", "0000000001", "0000000002"]);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut acc = BatchAccumulator::new(0);
        assert_eq!(acc.threshold(), 1);
        acc.add(record(0));
        assert_eq!(acc.flush_if_full().map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(BatchAccumulator::default().threshold(), DEFAULT_BATCH_SIZE);
    }
}
