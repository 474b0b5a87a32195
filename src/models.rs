//! Core data models used throughout the pipeline.
//!
//! These types represent the files, sources, records, and chunks that flow
//! from discovery through ingestion into the index.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// A file found under the data root. Only lives through discovery and
/// filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute (or root-joined) path.
    pub path: PathBuf,
    /// Path relative to the data root, `/`-separated.
    pub relative: String,
    /// Lower-cased extension including the leading dot, or empty.
    pub extension: String,
    /// Final path component.
    pub file_name: String,
}

impl CandidateFile {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            relative,
            extension,
            file_name,
        }
    }
}

/// Identity of a content source, derived from its path.
///
/// Hashes the raw path bytes, so file names that are not valid UTF-8 still
/// get distinct keys. The merger checks for collisions anyway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn from_path(path: &Path) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        let digest = hasher.finalize();
        Self(format!("{:x}", digest)[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata attached to every record a source emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub path: String,
    pub relative_path: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub seen_at: DateTime<Utc>,
}

impl SourceMetadata {
    pub fn from_fs(path: &Path, relative: &str, meta: &std::fs::Metadata) -> Self {
        Self {
            path: path.to_string_lossy().to_string(),
            relative_path: relative.to_string(),
            size: meta.len(),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
            created_at: meta.created().ok().map(DateTime::<Utc>::from),
            seen_at: Utc::now(),
        }
    }

    /// Whether `other` describes a different version of the same file.
    pub fn changed_since(&self, other: &SourceMetadata) -> bool {
        self.size != other.size || self.modified_at != other.modified_at
    }
}

/// One materialized row of a content source: raw bytes plus metadata.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub key: SourceKey,
    pub data: Vec<u8>,
    pub metadata: SourceMetadata,
}

/// A chunk of a document's text, as produced by a splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_key: SourceKey,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}
