//! GIB Registry Sync
//!
//! Mirrors the GIB e-invoice registered user list into Postgres.
//!
//! The provider delivers the list as zip partitions, each holding one XML
//! document. Every alias found is upserted keyed by
//! `(identifier, alias, document_type)`; rows the provider no longer lists
//! stay in the table with `is_active = false`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gib_sync::config::SyncConfig;
//! use gib_sync::provider::SoapPartitionSource;
//! use gib_sync::store::PgRegistryStore;
//! use gib_sync::sync::Synchronizer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let source = SoapPartitionSource::new(&config.provider)?;
//!     let store = PgRegistryStore::connect(&config.database, config.run.write_chunk_size).await?;
//!
//!     let summary = Synchronizer::new(config.sync_options(), Arc::new(source), Arc::new(store))
//!         .run()
//!         .await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod provider;
pub mod store;
pub mod sync;

pub use error::{Result, SyncError};
pub use models::{DocumentType, PartitionBlob, RecordKey, RegistryRecord, Role};
pub use sync::{RunSummary, SyncOptions, Synchronizer};
