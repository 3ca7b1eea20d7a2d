//! Error types for the sync pipeline
//!
//! Each concern has its own enum so callers can tell the severities apart:
//! archive and extraction errors only ever cost one partition, store write
//! errors stop the partition loop, and `SyncError` ends the run.

use thiserror::Error;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Run-level (fatal) errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store unreachable: {0}")]
    StoreUnreachable(#[source] StoreError),

    #[error("Partition fetch failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider returned no partitions")]
    NoPartitions,
}

/// Missing or malformed configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set. Add it to the environment or the .env file.")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Failure to open a partition archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Partition is empty")]
    Empty,

    #[error("Partition is not a valid zip archive: {0}")]
    Invalid(#[source] zip::result::ZipError),

    #[error("Partition archive has no entries")]
    NoEntries,

    #[error("Failed to read archive entry: {0}")]
    Entry(#[source] zip::result::ZipError),

    #[error("Scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to parse a partition document
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Document has no root element")]
    EmptyDocument,
}

/// Anything that costs a single partition
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Remote provider failures
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },

    #[error("Malformed provider response: {0}")]
    Response(String),

    #[error("Partition {index} is not valid base64: {source}")]
    Base64 {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },
}

/// Persistent store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
