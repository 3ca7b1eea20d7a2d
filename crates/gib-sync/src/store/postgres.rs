//! Postgres registry store

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, instrument};

use crate::config::{DatabaseConfig, DatabaseTarget, DEFAULT_WRITE_CHUNK_SIZE};
use crate::error::StoreError;
use crate::models::RegistryRecord;
use crate::store::{collapse_duplicate_keys, RegistryStore, StoreCounts};

/// Table holding the synchronized registry
pub const USER_LIST_TABLE: &str = "sovos_gib_user_list";

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Registry store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgRegistryStore {
    pool: PgPool,
    write_chunk_size: usize,
}

impl PgRegistryStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_chunk_size(pool, DEFAULT_WRITE_CHUNK_SIZE)
    }

    /// Rows per INSERT statement; zero is treated as one
    pub fn with_chunk_size(pool: PgPool, write_chunk_size: usize) -> Self {
        Self {
            pool,
            write_chunk_size: write_chunk_size.max(1),
        }
    }

    /// Open a connection pool for `config`
    pub async fn connect(config: &DatabaseConfig, write_chunk_size: usize) -> Result<Self, StoreError> {
        let options = match &config.target {
            DatabaseTarget::Url(url) => PgConnectOptions::from_str(url.expose())?,
            DatabaseTarget::Parts {
                host,
                port,
                database,
                user,
                password,
            } => PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(database)
                .username(user)
                .password(password.expose()),
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await?;

        info!(
            database = %config.describe(),
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self::with_chunk_size(pool, write_chunk_size))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn upsert_chunk(
        tx: &mut Transaction<'_, Postgres>,
        records: &[&RegistryRecord],
    ) -> Result<u64, StoreError> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            INSERT INTO {USER_LIST_TABLE} (
                identifier,
                alias,
                title,
                type,
                document_type,
                first_creation_time,
                is_active,
                created_at,
                last_synced_at
            )
            "#
        ));

        query_builder.push_values(records, |mut b, record| {
            b.push_bind(&record.identifier)
                .push_bind(&record.alias)
                .push_bind(&record.title)
                .push_bind(record.role.as_str())
                .push_bind(record.document_type.as_str())
                .push_bind(record.first_creation_time)
                .push_bind(record.is_active)
                .push_bind(record.created_at)
                .push_bind(record.last_synced_at);
        });

        query_builder.push(
            r#"
            ON CONFLICT (identifier, alias, document_type)
            DO UPDATE SET
                title = EXCLUDED.title,
                is_active = EXCLUDED.is_active,
                last_synced_at = EXCLUDED.last_synced_at
            "#,
        );

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn ping(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {USER_LIST_TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn mark_all_inactive(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("UPDATE {USER_LIST_TABLE} SET is_active = false"))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn upsert_batch(&self, records: &[RegistryRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows = collapse_duplicate_keys(records);
        if rows.len() < records.len() {
            debug!(
                duplicates = records.len() - rows.len(),
                "Collapsed duplicate keys in batch"
            );
        }

        let mut tx = self.pool.begin().await?;

        let total_chunks = rows.len().div_ceil(self.write_chunk_size);
        let mut written = 0;

        for (chunk_idx, chunk) in rows.chunks(self.write_chunk_size).enumerate() {
            debug!(
                chunk = chunk_idx + 1,
                total_chunks,
                rows = chunk.len(),
                "Writing upsert chunk"
            );
            written += Self::upsert_chunk(&mut tx, chunk).await?;
        }

        tx.commit().await?;

        Ok(written)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let (active, total): (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FILTER (WHERE is_active), COUNT(*) FROM {USER_LIST_TABLE}"
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts { active, total })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, Role};
    use chrono::{DateTime, Duration, NaiveDate, Utc};

    fn record(identifier: &str, alias: &str, title: &str, at: DateTime<Utc>) -> RegistryRecord {
        RegistryRecord {
            identifier: identifier.to_string(),
            alias: alias.to_string(),
            title: Some(title.to_string()),
            role: Role::Pk,
            document_type: DocumentType::Invoice,
            first_creation_time: NaiveDate::from_ymd_opt(2019, 5, 1)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            is_active: true,
            created_at: at,
            last_synced_at: at,
        }
    }

    async fn row(
        pool: &PgPool,
        identifier: &str,
    ) -> (Option<String>, bool, DateTime<Utc>, DateTime<Utc>) {
        sqlx::query_as(&format!(
            "SELECT title, is_active, created_at, last_synced_at FROM {USER_LIST_TABLE} WHERE identifier = $1"
        ))
        .bind(identifier)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_upsert_is_idempotent(pool: PgPool) -> Result<(), StoreError> {
        let store = PgRegistryStore::with_chunk_size(pool.clone(), 2);
        let now = Utc::now();
        let batch: Vec<_> = (0..5)
            .map(|i| record(&format!("{i:010}"), "urn:mail:pk@x.com", "Firma", now))
            .collect();

        assert_eq!(store.upsert_batch(&batch).await?, 5);
        store.upsert_batch(&batch).await?;

        let counts = store.counts().await?;
        assert_eq!(counts, StoreCounts { active: 5, total: 5 });
        assert_eq!(store.ping().await?, 5);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_conflict_updates_only_mutable_columns(pool: PgPool) -> Result<(), StoreError> {
        let store = PgRegistryStore::new(pool.clone());
        let first = Utc::now() - Duration::days(1);
        let second = Utc::now();

        store
            .upsert_batch(&[record("1111111111", "urn:mail:a@x.com", "Eski Unvan", first)])
            .await?;
        store.mark_all_inactive().await?;
        store
            .upsert_batch(&[record("1111111111", "urn:mail:a@x.com", "Yeni Unvan", second)])
            .await?;

        let (title, active, created_at, synced_at) = row(&pool, "1111111111").await;
        assert_eq!(title.as_deref(), Some("Yeni Unvan"));
        assert!(active);
        assert_eq!(created_at.timestamp(), first.timestamp());
        assert_eq!(synced_at.timestamp(), second.timestamp());
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_reconciliation_deactivates_missing_rows(pool: PgPool) -> Result<(), StoreError> {
        let store = PgRegistryStore::new(pool.clone());
        let now = Utc::now();

        store
            .upsert_batch(&[
                record("1", "urn:mail:a@x.com", "A", now),
                record("2", "urn:mail:b@x.com", "B", now),
            ])
            .await?;

        assert_eq!(store.mark_all_inactive().await?, 2);
        store
            .upsert_batch(&[record("1", "urn:mail:a@x.com", "A", now)])
            .await?;

        assert_eq!(store.counts().await?, StoreCounts { active: 1, total: 2 });
        let (_, still_listed, _, _) = row(&pool, "1").await;
        let (_, dropped, _, _) = row(&pool, "2").await;
        assert!(still_listed);
        assert!(!dropped);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_duplicate_keys_in_one_batch(pool: PgPool) -> Result<(), StoreError> {
        let store = PgRegistryStore::new(pool.clone());
        let now = Utc::now();

        store
            .upsert_batch(&[
                record("1", "urn:mail:a@x.com", "first", now),
                record("1", "urn:mail:a@x.com", "last", now),
            ])
            .await?;

        let (title, _, _, _) = row(&pool, "1").await;
        assert_eq!(title.as_deref(), Some("last"));
        assert_eq!(store.counts().await?.total, 1);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_empty_batch_is_noop(pool: PgPool) -> Result<(), StoreError> {
        let store = PgRegistryStore::new(pool);
        assert_eq!(store.upsert_batch(&[]).await?, 0);
        assert_eq!(store.counts().await?, StoreCounts::default());
        Ok(())
    }
}
