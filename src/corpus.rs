//! Merging per-file sources into one corpus.
//!
//! The merged [`Corpus`] is the single logical table handed to the index.
//! Every source key must be unique across the corpus; [`CorpusMerger`]
//! checks this before merging and refuses to continue on a collision.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ingest::ContentSource;
use crate::models::{SourceKey, SourceRecord};

/// The union of all ingested content sources.
#[derive(Debug, Clone)]
pub struct Corpus {
    sources: Vec<ContentSource>,
}

impl Corpus {
    pub fn sources(&self) -> &[ContentSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Always false for a corpus built by [`CorpusMerger::merge`].
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, key: &SourceKey) -> Option<&ContentSource> {
        self.sources.iter().find(|s| s.key() == key)
    }

    /// Number of rows the corpus yields: one per source.
    pub fn row_count(&self) -> usize {
        self.sources.len()
    }

    /// Read every source once. Sources that fail to read at this point are
    /// logged and left out of the snapshot.
    pub fn snapshot(&self) -> Vec<SourceRecord> {
        self.sources
            .iter()
            .filter_map(|source| match source.read() {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping file {}: {}", source.path().display(), e);
                    None
                }
            })
            .collect()
    }
}

/// Combines content sources after checking their keys are disjoint.
pub struct CorpusMerger;

impl CorpusMerger {
    pub fn merge(sources: Vec<ContentSource>) -> Result<Corpus> {
        if sources.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        if sources.len() > 1 {
            tracing::debug!(sources = sources.len(), "checking source keys are disjoint");
            check_disjoint(&sources)?;
        }

        tracing::info!(sources = sources.len(), "corpus merged");
        Ok(Corpus { sources })
    }
}

fn check_disjoint(sources: &[ContentSource]) -> Result<()> {
    let mut seen: HashMap<&SourceKey, &Path> = HashMap::with_capacity(sources.len());
    for source in sources {
        if let Some(first) = seen.insert(source.key(), source.path()) {
            return Err(Error::DuplicateSourceKey {
                key: source.key().to_string(),
                first: first.to_path_buf(),
                second: source.path().to_path_buf(),
            });
        }
    }
    Ok(())
}
