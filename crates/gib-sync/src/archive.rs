//! Partition archive decoding
//!
//! Every partition is a zip archive with a single XML entry. The blob is
//! spilled to a scratch file so the zip reader can seek; the scratch file
//! belongs to the [`PartitionArchive`] and is removed when it is dropped,
//! whichever way processing of the partition ends.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::models::PartitionBlob;

const SCRATCH_PREFIX: &str = "gib-partition-";

/// An opened partition archive backed by a scratch file
pub struct PartitionArchive {
    // Field order matters: the zip reader's handle closes before the
    // scratch file is unlinked.
    archive: ZipArchive<File>,
    scratch: NamedTempFile,
}

impl PartitionArchive {
    /// Open a partition using the system temp directory for the scratch file
    pub fn open(blob: &PartitionBlob) -> Result<Self, ArchiveError> {
        Self::open_in(blob, std::env::temp_dir())
    }

    /// Open a partition, placing the scratch file in `dir`
    pub fn open_in(blob: &PartitionBlob, dir: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        if blob.is_empty() {
            return Err(ArchiveError::Empty);
        }

        let mut scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(".zip")
            .tempfile_in(dir)?;
        scratch.write_all(blob.as_bytes())?;
        scratch.flush()?;

        let archive = ZipArchive::new(scratch.reopen()?).map_err(ArchiveError::Invalid)?;
        if archive.is_empty() {
            return Err(ArchiveError::NoEntries);
        }

        debug!(
            bytes = blob.len(),
            entries = archive.len(),
            scratch = %scratch.path().display(),
            "Opened partition archive"
        );

        Ok(Self { archive, scratch })
    }

    /// Path of the scratch file; gone once the archive is dropped
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Name of the first entry, for diagnostics
    pub fn entry_name(&self) -> Option<&str> {
        self.archive.name_for_index(0)
    }

    /// Stream the decompressed content of the first (and only expected) entry
    pub fn document(&mut self) -> Result<impl Read + '_, ArchiveError> {
        if self.archive.len() > 1 {
            debug!(entries = self.archive.len(), "Archive has extra entries, using the first");
        }

        let entry = self.archive.by_index(0).map_err(ArchiveError::Entry)?;
        debug!(entry = entry.name(), size = entry.size(), "Reading partition document");
        Ok(entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &str)]) -> PartitionBlob {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        PartitionBlob::new(writer.finish().unwrap().into_inner())
    }

    fn scratch_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_reads_first_entry() {
        let blob = zip_with(&[("UserList_1.xml", "<UserList/>"), ("extra.txt", "ignored")]);
        let mut archive = PartitionArchive::open(&blob).unwrap();

        assert_eq!(archive.entry_name(), Some("UserList_1.xml"));

        let mut content = String::new();
        archive.document().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "<UserList/>");
    }

    #[test]
    fn test_empty_blob() {
        let result = PartitionArchive::open(&PartitionBlob::default());
        assert!(matches!(result, Err(ArchiveError::Empty)));
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let blob = PartitionBlob::new(b"definitely not a zip".to_vec());

        let result = PartitionArchive::open_in(&blob, dir.path());
        assert!(matches!(result, Err(ArchiveError::Invalid(_))));
        assert_eq!(scratch_files(dir.path()), 0, "scratch file leaked on failure");
    }

    #[test]
    fn test_archive_without_entries() {
        let dir = tempfile::tempdir().unwrap();
        let blob = zip_with(&[]);

        let result = PartitionArchive::open_in(&blob, dir.path());
        assert!(matches!(result, Err(ArchiveError::NoEntries)));
        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let blob = zip_with(&[("list.xml", "<UserList/>")]);

        let archive = PartitionArchive::open_in(&blob, dir.path()).unwrap();
        let path = archive.scratch_path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(SCRATCH_PREFIX));

        drop(archive);
        assert!(!path.exists());
        assert_eq!(scratch_files(dir.path()), 0);
    }
}
