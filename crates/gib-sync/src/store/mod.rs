//! Registry persistence
//!
//! Rows are keyed by `(identifier, alias, document_type)`. A run first marks
//! every row inactive, then upserts what the provider still lists, which
//! flips those rows back to active. Rows are never deleted.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{RecordKey, RegistryRecord};

pub use memory::MemoryRegistryStore;
pub use postgres::{PgRegistryStore, USER_LIST_TABLE};

/// Active and total row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub active: i64,
    pub total: i64,
}

impl StoreCounts {
    pub fn inactive(&self) -> i64 {
        self.total - self.active
    }
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Check that the store is reachable, returning the current row count
    async fn ping(&self) -> Result<i64, StoreError>;

    /// Flag every row inactive, returning how many rows were touched
    async fn mark_all_inactive(&self) -> Result<u64, StoreError>;

    /// Insert or update `records` atomically, returning how many rows were
    /// written. On conflict only `title`, `is_active` and `last_synced_at`
    /// change.
    async fn upsert_batch(&self, records: &[RegistryRecord]) -> Result<u64, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}

/// Drop earlier records whose key appears again later in the batch.
///
/// The surviving records keep the position of their key's first occurrence
/// and carry the values of its last one.
pub fn collapse_duplicate_keys(records: &[RegistryRecord]) -> Vec<&RegistryRecord> {
    let mut slots: HashMap<RecordKey, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<&RegistryRecord> = Vec::with_capacity(records.len());

    for record in records {
        match slots.get(&record.key()) {
            Some(&slot) => out[slot] = record,
            None => {
                slots.insert(record.key(), out.len());
                out.push(record);
            },
        }
    }

    out
}
