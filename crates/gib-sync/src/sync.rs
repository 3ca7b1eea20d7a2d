//! Registry synchronization run
//!
//! One run walks a fixed sequence of steps:
//!
//! 1. Check the store is reachable (fatal on failure)
//! 2. Mark every row inactive (best effort)
//! 3. Fetch the partition list (fatal on failure or when empty)
//! 4. Decode, parse and extract each partition, writing full batches
//! 5. Flush the remaining records, once
//! 6. Report active/total counts (best effort)
//!
//! A partition that cannot be decoded is skipped. A batch that cannot be
//! written stops the partition loop once the current partition has been
//! buffered. Its records stay pending, so the final flush retries them once
//! before the report.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::archive::PartitionArchive;
use crate::batch::{BatchAccumulator, DEFAULT_BATCH_SIZE};
use crate::error::{ArchiveError, PartitionError, Result, SyncError};
use crate::extract::{Extraction, ExtractionStats, RecordExtractor, UserListDocument};
use crate::models::{PartitionBlob, RegistryRecord};
use crate::provider::{PartitionQuery, PartitionSource};
use crate::store::{RegistryStore, StoreCounts};

/// Settings of a single run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub query: PartitionQuery,
    pub batch_size: usize,
    /// Where partition scratch files go; the system temp dir when `None`
    pub scratch_dir: Option<PathBuf>,
}

impl SyncOptions {
    pub fn new(query: PartitionQuery) -> Self {
        Self {
            query,
            batch_size: DEFAULT_BATCH_SIZE,
            scratch_dir: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows in the store before the run
    pub existing_rows: i64,
    /// Rows flagged inactive at the start; `None` if that step failed
    pub marked_inactive: Option<u64>,
    pub partitions_total: usize,
    /// Partitions that decoded and produced at least one record
    pub partitions_succeeded: usize,
    /// Partitions that could not be decoded or parsed
    pub partitions_failed: usize,
    /// Partitions that parsed but produced no records
    pub partitions_without_records: usize,
    pub records_extracted: usize,
    pub records_skipped: usize,
    pub batches_committed: usize,
    pub records_committed: usize,
    pub failed_batches: usize,
    /// The partition loop stopped early because a batch write failed; the
    /// records of that batch were retried by the final flush
    pub aborted: bool,
    /// Counts after the run; `None` if they could not be read
    pub final_counts: Option<StoreCounts>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} partitions, {} records committed in {} batches",
            self.partitions_succeeded,
            self.partitions_total,
            self.records_committed,
            self.batches_committed
        )?;
        if let Some(counts) = self.final_counts {
            write!(f, ", {} active of {}", counts.active, counts.total)?;
        }
        if self.aborted {
            f.write_str(" (aborted)")?;
        }
        Ok(())
    }
}

/// Drives one synchronization run from a partition source into a store
pub struct Synchronizer {
    options: SyncOptions,
    source: Arc<dyn PartitionSource>,
    store: Arc<dyn RegistryStore>,
    extractor: RecordExtractor,
}

impl Synchronizer {
    pub fn new(
        options: SyncOptions,
        source: Arc<dyn PartitionSource>,
        store: Arc<dyn RegistryStore>,
    ) -> Self {
        let extractor = RecordExtractor::new(options.query.role);
        Self {
            options,
            source,
            store,
            extractor,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        info!(role = %self.options.query.role, batch_size = self.options.batch_size, "Starting registry sync");

        summary.existing_rows = self.store.ping().await.map_err(SyncError::StoreUnreachable)?;
        info!(rows = summary.existing_rows, "Store reachable");

        match self.store.mark_all_inactive().await {
            Ok(rows) => {
                info!(rows, "Marked existing rows inactive");
                summary.marked_inactive = Some(rows);
            },
            Err(e) => warn!(error = %e, "Failed to mark rows inactive, continuing"),
        }

        let partitions = self.source.fetch_partitions(&self.options.query).await?;
        if partitions.is_empty() {
            return Err(SyncError::NoPartitions);
        }
        summary.partitions_total = partitions.len();
        info!(partitions = summary.partitions_total, "Processing partitions");

        let mut batch = BatchAccumulator::new(self.options.batch_size);

        for (idx, blob) in partitions.into_iter().enumerate() {
            let index = idx + 1;

            let decoded = self.decode_partition(&blob);
            drop(blob);

            let document = match decoded {
                Ok(document) => document,
                Err(PartitionError::Archive(ArchiveError::Empty)) => {
                    warn!(partition = index, "Partition is empty, skipping");
                    summary.partitions_failed += 1;
                    continue;
                },
                Err(e) => {
                    error!(partition = index, error = %e, "Failed to decode partition, skipping");
                    summary.partitions_failed += 1;
                    continue;
                },
            };

            let mut stats = ExtractionStats::default();
            for extraction in self.extractor.extract(&document) {
                stats.observe(&extraction);
                let Extraction::Record(record) = extraction else {
                    continue;
                };

                batch.add(record);
                // After a failed write the rest of this partition is only buffered
                if summary.aborted {
                    continue;
                }
                if let Some(full) = batch.flush_if_full() {
                    if !self.write_batch(&full, &mut summary).await {
                        batch.restore(full);
                        summary.aborted = true;
                    }
                }
            }

            summary.records_extracted += stats.records;
            summary.records_skipped += stats.skipped();

            if stats.records > 0 {
                summary.partitions_succeeded += 1;
            } else {
                summary.partitions_without_records += 1;
            }
            info!(
                partition = index,
                total = summary.partitions_total,
                records = stats.records,
                skipped = stats.skipped(),
                deleted = stats.deleted_aliases,
                invalid_dates = stats.invalid_creation_time,
                "Partition processed"
            );

            if summary.aborted {
                error!(
                    partition = index,
                    pending = batch.len(),
                    "Batch write failed, stopping partition processing"
                );
                break;
            }
        }

        let remainder = batch.flush_remainder();
        self.write_batch(&remainder, &mut summary).await;

        match self.store.counts().await {
            Ok(counts) => summary.final_counts = Some(counts),
            Err(e) => warn!(error = %e, "Failed to read final counts"),
        }

        info!(
            partitions_succeeded = summary.partitions_succeeded,
            partitions_failed = summary.partitions_failed,
            partitions_without_records = summary.partitions_without_records,
            partitions_total = summary.partitions_total,
            records_committed = summary.records_committed,
            records_skipped = summary.records_skipped,
            active = summary.final_counts.map(|c| c.active),
            total = summary.final_counts.map(|c| c.total),
            aborted = summary.aborted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Registry sync finished"
        );

        Ok(summary)
    }

    /// Open the archive and parse its document; the scratch file is gone
    /// by the time this returns
    fn decode_partition(&self, blob: &PartitionBlob) -> std::result::Result<UserListDocument, PartitionError> {
        let mut archive = match &self.options.scratch_dir {
            Some(dir) => PartitionArchive::open_in(blob, dir)?,
            None => PartitionArchive::open(blob)?,
        };
        let document = UserListDocument::parse(archive.document()?)?;
        Ok(document)
    }

    /// Returns false when the write failed
    async fn write_batch(&self, records: &[RegistryRecord], summary: &mut RunSummary) -> bool {
        match self.store.upsert_batch(records).await {
            Ok(rows) => {
                if !records.is_empty() {
                    summary.batches_committed += 1;
                    summary.records_committed += records.len();
                    info!(records = records.len(), rows, "Committed batch");
                }
                true
            },
            Err(e) => {
                summary.failed_batches += 1;
                error!(records = records.len(), error = %e, "Failed to write batch");
                false
            },
        }
    }
}
