//! Opening filtered files as independent content sources.
//!
//! Each file becomes a [`ContentSource`]: a lazy descriptor that knows its
//! identity key, path, and mode but holds no bytes until [`ContentSource::read`]
//! is called. Opening is attempted once per file up front so unreadable
//! paths are skipped here with a warning instead of failing later.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::IngestMode;
use crate::error::{Error, Result};
use crate::models::{CandidateFile, SourceKey, SourceMetadata, SourceRecord};

/// A single ingested file.
#[derive(Debug, Clone)]
pub struct ContentSource {
    key: SourceKey,
    path: PathBuf,
    relative: String,
    mode: IngestMode,
    metadata: SourceMetadata,
}

impl ContentSource {
    /// Open `file` to confirm it is readable and capture its metadata.
    pub fn open(file: &CandidateFile, mode: IngestMode) -> std::io::Result<Self> {
        let handle = File::open(&file.path)?;
        let meta = handle.metadata()?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok(Self {
            key: SourceKey::from_path(&file.path),
            path: file.path.clone(),
            relative: file.relative.clone(),
            mode,
            metadata: SourceMetadata::from_fs(&file.path, &file.relative, &meta),
        })
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    /// Metadata captured when the source was opened.
    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    /// Current on-disk metadata, for change detection.
    pub fn stat(&self) -> std::io::Result<SourceMetadata> {
        let meta = std::fs::metadata(&self.path)?;
        Ok(SourceMetadata::from_fs(&self.path, &self.relative, &meta))
    }

    /// Materialize the source's single record.
    pub fn read(&self) -> std::io::Result<SourceRecord> {
        let data = std::fs::read(&self.path)?;
        let mut metadata = self.stat()?;
        // The bytes just read are authoritative for size.
        metadata.size = data.len() as u64;
        Ok(SourceRecord {
            key: self.key.clone(),
            data,
            metadata,
        })
    }
}

/// Opens every filtered file, tolerating per-file failures.
pub struct SourceIngestor {
    mode: IngestMode,
}

impl SourceIngestor {
    pub fn new(mode: IngestMode) -> Self {
        Self { mode }
    }

    /// Open each file in turn. Failures are logged and skipped; only an
    /// entirely unreadable set is an error.
    pub fn ingest(&self, files: &[CandidateFile]) -> Result<Vec<ContentSource>> {
        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            match ContentSource::open(file, self.mode) {
                Ok(source) => sources.push(source),
                Err(e) => {
                    tracing::warn!("Skipping file {}: {}", file.path.display(), e);
                }
            }
        }

        if sources.is_empty() {
            return Err(Error::NoReadableSource {
                attempted: files.len(),
            });
        }

        tracing::info!(
            opened = sources.len(),
            skipped = files.len() - sources.len(),
            mode = %self.mode,
            "content sources opened"
        );
        Ok(sources)
    }
}
