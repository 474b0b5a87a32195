//! Change polling for `streaming` mode.
//!
//! Every `data_source.poll_interval_secs` the watcher stats each corpus
//! source. A changed size or mtime re-reads the file and upserts it into
//! the index under the same key; a file that vanished is removed from the
//! index and re-added if it comes back. The set of sources is fixed at
//! startup: new files are not picked up.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::index::VectorIndex;
use crate::ingest::ContentSource;
use crate::models::{SourceKey, SourceMetadata};

/// Outcome of one polling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub updated: usize,
    pub removed: usize,
}

pub struct SourceWatcher {
    sources: Vec<ContentSource>,
    index: Arc<VectorIndex>,
    interval: Duration,
    seen: HashMap<SourceKey, Option<SourceMetadata>>,
}

impl SourceWatcher {
    /// Baselines are the metadata captured when each source was opened.
    pub fn new(sources: Vec<ContentSource>, index: Arc<VectorIndex>, interval: Duration) -> Self {
        let seen = sources
            .iter()
            .map(|s| (s.key().clone(), Some(s.metadata().clone())))
            .collect();
        Self {
            sources,
            index,
            interval,
            seen,
        }
    }

    /// Stat every source once and apply the differences to the index.
    pub async fn poll_once(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();

        for source in &self.sources {
            let previous = self.seen.get(source.key()).cloned().flatten();
            match source.stat() {
                Ok(current) => {
                    let changed = previous
                        .as_ref()
                        .map_or(true, |prev| current.changed_since(prev));
                    if !changed {
                        continue;
                    }
                    let record = match source.read() {
                        Ok(record) => record,
                        Err(e) => {
                            tracing::warn!("Skipping file {}: {}", source.path().display(), e);
                            continue;
                        }
                    };
                    let metadata = record.metadata.clone();
                    match self.index.upsert(record).await {
                        Ok(chunks) => {
                            tracing::info!("Re-indexed {} ({} chunks)", source.relative(), chunks);
                            self.seen.insert(source.key().clone(), Some(metadata));
                            summary.updated += 1;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to re-index {}: {:#}", source.relative(), e);
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if previous.is_some() {
                        self.index.remove(source.key()).await;
                        self.seen.insert(source.key().clone(), None);
                        tracing::info!("Removed {} from the index", source.relative());
                        summary.removed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", source.path().display(), e);
                }
            }
        }

        summary
    }

    /// Run [`poll_once`](Self::poll_once) on a fixed interval until the
    /// task is aborted.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Watching {} sources every {:?}",
                self.sources.len(),
                self.interval
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; startup already indexed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let summary = self.poll_once().await;
                if summary != PollSummary::default() {
                    tracing::debug!(?summary, "poll applied changes");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::TokenCountSplitter;
    use crate::config::IngestMode;
    use crate::corpus::CorpusMerger;
    use crate::extract::Utf8Parser;
    use crate::ingest::SourceIngestor;
    use crate::models::CandidateFile;
    use crate::test_util::LetterEmbedder;
    use std::fs;
    use tempfile::TempDir;

    async fn setup(tmp: &TempDir) -> (SourceWatcher, Arc<VectorIndex>) {
        fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        fs::write(tmp.path().join("b.md"), "beta").unwrap();
        let files: Vec<CandidateFile> = ["a.md", "b.md"]
            .iter()
            .map(|n| CandidateFile::new(tmp.path(), tmp.path().join(n)))
            .collect();
        let sources = SourceIngestor::new(IngestMode::Streaming)
            .ingest(&files)
            .unwrap();
        let corpus = CorpusMerger::merge(sources).unwrap();

        let index = Arc::new(VectorIndex::new(
            Arc::new(Utf8Parser),
            Arc::new(TokenCountSplitter::new(100)),
            Arc::new(LetterEmbedder),
        ));
        index.build(corpus.snapshot()).await.unwrap();
        let watcher = SourceWatcher::new(
            corpus.sources().to_vec(),
            index.clone(),
            Duration::from_millis(10),
        );
        (watcher, index)
    }

    #[tokio::test]
    async fn test_unchanged_sources_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        let (mut watcher, _) = setup(&tmp).await;
        assert_eq!(watcher.poll_once().await, PollSummary::default());
    }

    #[tokio::test]
    async fn test_modified_file_is_reindexed() {
        let tmp = TempDir::new().unwrap();
        let (mut watcher, index) = setup(&tmp).await;

        fs::write(tmp.path().join("a.md"), "alpha, now with more words").unwrap();
        let summary = watcher.poll_once().await;
        assert_eq!(summary.updated, 1);

        let hits = index.search("alpha now with more words", 1).await.unwrap();
        assert_eq!(hits[0].text, "alpha, now with more words");
        assert_eq!(index.statistics().await.file_count, 2);

        assert_eq!(watcher.poll_once().await, PollSummary::default());
    }

    #[tokio::test]
    async fn test_deleted_file_removed_then_restored() {
        let tmp = TempDir::new().unwrap();
        let (mut watcher, index) = setup(&tmp).await;

        fs::remove_file(tmp.path().join("b.md")).unwrap();
        assert_eq!(watcher.poll_once().await.removed, 1);
        assert_eq!(index.statistics().await.file_count, 1);
        assert_eq!(watcher.poll_once().await, PollSummary::default());

        fs::write(tmp.path().join("b.md"), "beta again").unwrap();
        assert_eq!(watcher.poll_once().await.updated, 1);
        assert_eq!(index.statistics().await.file_count, 2);
    }
}
