//! In-process registry store
//!
//! Same conflict semantics as the Postgres store. Used for `--dry-run` and
//! for exercising the synchronizer without a database; individual operations
//! can be made to fail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{RecordKey, RegistryRecord, Role};
use crate::store::{collapse_duplicate_keys, RegistryStore, StoreCounts};

/// Stored state of one registry row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub title: Option<String>,
    pub role: Role,
    pub first_creation_time: NaiveDateTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

impl From<&RegistryRecord> for StoredRow {
    fn from(record: &RegistryRecord) -> Self {
        Self {
            title: record.title.clone(),
            role: record.role,
            first_creation_time: record.first_creation_time,
            is_active: record.is_active,
            created_at: record.created_at,
            last_synced_at: record.last_synced_at,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    rows: Mutex<BTreeMap<RecordKey, StoredRow>>,
    upserts: Mutex<Vec<usize>>,
    fail_ping: AtomicBool,
    fail_mark_inactive: AtomicBool,
    fail_counts: AtomicBool,
    /// 1-based index of the upsert call that fails; 0 disables
    fail_upsert_call: AtomicUsize,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing rows
    pub fn with_rows(records: &[RegistryRecord]) -> Self {
        let rows = records.iter().map(|r| (r.key(), StoredRow::from(r))).collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn fail_ping(self) -> Self {
        self.fail_ping.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_mark_inactive(self) -> Self {
        self.fail_mark_inactive.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_counts(self) -> Self {
        self.fail_counts.store(true, Ordering::SeqCst);
        self
    }

    /// Make the `call`-th upsert (1-based, empty batches included) fail
    pub fn fail_upsert_call(self, call: usize) -> Self {
        self.fail_upsert_call.store(call, Ordering::SeqCst);
        self
    }

    pub async fn rows(&self) -> BTreeMap<RecordKey, StoredRow> {
        self.rows.lock().await.clone()
    }

    pub async fn row(&self, key: &RecordKey) -> Option<StoredRow> {
        self.rows.lock().await.get(key).cloned()
    }

    /// Size of every batch handed to `upsert_batch`, in call order,
    /// including the failed ones
    pub async fn upsert_calls(&self) -> Vec<usize> {
        self.upserts.lock().await.clone()
    }

    fn failure(operation: &str) -> StoreError {
        StoreError::Unavailable(format!("injected {operation} failure"))
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn ping(&self) -> Result<i64, StoreError> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(Self::failure("ping"));
        }
        Ok(self.rows.lock().await.len() as i64)
    }

    async fn mark_all_inactive(&self) -> Result<u64, StoreError> {
        if self.fail_mark_inactive.load(Ordering::SeqCst) {
            return Err(Self::failure("mark inactive"));
        }
        let mut rows = self.rows.lock().await;
        rows.values_mut().for_each(|row| row.is_active = false);
        Ok(rows.len() as u64)
    }

    async fn upsert_batch(&self, records: &[RegistryRecord]) -> Result<u64, StoreError> {
        let call = {
            let mut upserts = self.upserts.lock().await;
            upserts.push(records.len());
            upserts.len()
        };
        if self.fail_upsert_call.load(Ordering::SeqCst) == call {
            return Err(Self::failure("upsert"));
        }

        let mut rows = self.rows.lock().await;
        let collapsed = collapse_duplicate_keys(records);
        for record in &collapsed {
            rows.entry(record.key())
                .and_modify(|row| {
                    row.title = record.title.clone();
                    row.is_active = record.is_active;
                    row.last_synced_at = record.last_synced_at;
                })
                .or_insert_with(|| StoredRow::from(*record));
        }

        Ok(collapsed.len() as u64)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(Self::failure("counts"));
        }
        let rows = self.rows.lock().await;
        Ok(StoreCounts {
            active: rows.values().filter(|row| row.is_active).count() as i64,
            total: rows.len() as i64,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use chrono::{Duration, NaiveDate};

    fn record(identifier: &str, title: &str, at: DateTime<Utc>) -> RegistryRecord {
        RegistryRecord {
            identifier: identifier.to_string(),
            alias: "urn:mail:pk@x.com".to_string(),
            title: Some(title.to_string()),
            role: Role::Pk,
            document_type: DocumentType::Invoice,
            first_creation_time: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            is_active: true,
            created_at: at,
            last_synced_at: at,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let store = MemoryRegistryStore::new();
        let first = Utc::now() - Duration::hours(1);
        let second = Utc::now();

        store.upsert_batch(&[record("1", "old", first)]).await.unwrap();
        store.upsert_batch(&[record("1", "new", second)]).await.unwrap();

        let row = store.row(&record("1", "", first).key()).await.unwrap();
        assert_eq!(row.title.as_deref(), Some("new"));
        assert_eq!(row.created_at, first);
        assert_eq!(row.last_synced_at, second);
        assert_eq!(store.counts().await.unwrap(), StoreCounts { active: 1, total: 1 });
    }

    #[tokio::test]
    async fn test_mark_all_inactive_then_reaffirm() {
        let now = Utc::now();
        let store = MemoryRegistryStore::with_rows(&[record("1", "a", now), record("2", "b", now)]);

        assert_eq!(store.mark_all_inactive().await.unwrap(), 2);
        store.upsert_batch(&[record("2", "b", now)]).await.unwrap();

        assert_eq!(store.counts().await.unwrap(), StoreCounts { active: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryRegistryStore::new()
            .fail_ping()
            .fail_counts()
            .fail_upsert_call(2);

        assert!(store.ping().await.is_err());
        assert!(store.counts().await.is_err());
        assert!(store.mark_all_inactive().await.is_ok());

        let now = Utc::now();
        assert!(store.upsert_batch(&[record("1", "a", now)]).await.is_ok());
        assert!(store.upsert_batch(&[record("2", "b", now)]).await.is_err());
        assert!(store.upsert_batch(&[]).await.is_ok());
        assert_eq!(store.upsert_calls().await, vec![1, 1, 0]);
        assert_eq!(store.rows().await.len(), 1);
    }
}
