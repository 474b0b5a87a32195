//! Recursive file discovery under the data root.
//!
//! Walks the tree and returns every regular file, pruning version-control
//! metadata and bytecode-cache directories before descending into them.
//! Traversal order is whatever the filesystem yields; callers that need a
//! stable order sort the result.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::models::CandidateFile;

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[".git", "__pycache__"];

/// Walks a data root and produces candidate files.
pub struct FileDiscoverer {
    root: PathBuf,
}

impl FileDiscoverer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List every regular file reachable from the root.
    ///
    /// Fails with [`Error::DataDirectoryNotFound`] when the root is missing
    /// or not a directory. Unreadable subdirectories are logged and skipped.
    pub fn discover(&self) -> Result<Vec<CandidateFile>> {
        if !self.root.is_dir() {
            return Err(Error::DataDirectoryNotFound(self.root.clone()));
        }

        tracing::info!(root = %self.root.display(), "scanning files");

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry during scan");
                    continue;
                }
            };

            // Symlinks count when they point at a regular file.
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }

            files.push(CandidateFile::new(&self.root, entry.into_path()));
        }

        Ok(files)
    }
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}
