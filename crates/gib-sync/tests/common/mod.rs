//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use gib_sync::error::ProviderError;
use gib_sync::models::{PartitionBlob, Role};
use gib_sync::provider::{PartitionQuery, PartitionSource};
use gib_sync::sync::SyncOptions;
use zip::write::SimpleFileOptions;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("Failed to read fixture")
}

/// Zip `xml` as the single entry of a partition
pub fn zip_partition(xml: &str) -> PartitionBlob {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("UserList.xml", SimpleFileOptions::default())
        .expect("Failed to start zip entry");
    writer.write_all(xml.as_bytes()).expect("Failed to write zip entry");
    PartitionBlob::new(writer.finish().expect("Failed to finish zip").into_inner())
}

/// A partition of `count` users numbered from `first`, one alias each
pub fn generated_partition(first: usize, count: usize) -> PartitionBlob {
    let users: String = (first..first + count)
        .map(|n| {
            format!(
                "<User><Identifier>{n:010}</Identifier><Title>Firma {n}</Title>\
                 <Documents><Document type=\"Invoice\"><Alias>\
                 <Name>urn:mail:defaultpk@firma{n}.com</Name>\
                 <CreationTime>2020-01-01T00:00:00</CreationTime>\
                 </Alias></Document></Documents></User>"
            )
        })
        .collect();
    zip_partition(&format!("<UserList>{users}</UserList>"))
}

pub fn query() -> PartitionQuery {
    PartitionQuery {
        identifier: "urn:mail:defaultgb@test.com".to_string(),
        vkn_tckn: "1234567890".to_string(),
        role: Role::Pk,
        include_binary: true,
    }
}

pub fn options(batch_size: usize) -> SyncOptions {
    SyncOptions::new(query()).with_batch_size(batch_size)
}

/// Serves a fixed list of partitions and records the queries it saw
pub struct StaticSource {
    partitions: Vec<PartitionBlob>,
    queries: Mutex<Vec<PartitionQuery>>,
}

impl StaticSource {
    pub fn new(partitions: Vec<PartitionBlob>) -> Self {
        Self {
            partitions,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<PartitionQuery> {
        self.queries.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl PartitionSource for StaticSource {
    async fn fetch_partitions(
        &self,
        query: &PartitionQuery,
    ) -> Result<Vec<PartitionBlob>, ProviderError> {
        self.queries.lock().expect("poisoned").push(query.clone());
        Ok(self.partitions.clone())
    }
}
