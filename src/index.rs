//! In-memory vector index over the merged corpus.
//!
//! Each [`SourceRecord`] is parsed, split into chunks and embedded; the
//! resulting vectors are held per [`SourceKey`] behind an async `RwLock`.
//! Search is brute-force cosine similarity over every stored chunk.
//!
//! Upserting a key replaces all of its chunks. Chunks whose content hash
//! matches a chunk from the previous version reuse the stored vector, so a
//! small edit to a large file only re-embeds what changed.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, SourceKey, SourceMetadata, SourceRecord};
use crate::traits::{DocumentParser, Embedder, Splitter};

struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

struct IndexedDocument {
    metadata: SourceMetadata,
    chunks: Vec<IndexedChunk>,
    indexed_at: DateTime<Utc>,
}

/// A chunk returned from [`VectorIndex::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub source_key: SourceKey,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
    pub metadata: SourceMetadata,
}

/// Snapshot of the index size and freshness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatistics {
    pub file_count: usize,
    pub chunk_count: usize,
    /// Most recent source modification time (unix seconds).
    pub last_modified: Option<i64>,
    /// Most recent indexing time (unix seconds).
    pub last_indexed: Option<i64>,
}

pub struct VectorIndex {
    parser: Arc<dyn DocumentParser>,
    splitter: Arc<dyn Splitter>,
    embedder: Arc<dyn Embedder>,
    docs: RwLock<HashMap<SourceKey, IndexedDocument>>,
}

impl VectorIndex {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        splitter: Arc<dyn Splitter>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            parser,
            splitter,
            embedder,
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Index a batch of records. Unparseable records are skipped with a
    /// warning; embedding failures abort.
    pub async fn build(&self, records: Vec<SourceRecord>) -> Result<usize> {
        let total = records.len();
        let mut chunk_count = 0;
        for record in records {
            chunk_count += self.upsert(record).await?;
        }
        tracing::info!("Indexed {} sources ({} chunks)", total, chunk_count);
        Ok(chunk_count)
    }

    /// Replace everything stored under `record.key`. Returns the new chunk
    /// count for that key.
    pub async fn upsert(&self, record: SourceRecord) -> Result<usize> {
        let text = match self.parser.parse(&record.data, &record.metadata) {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.docs.write().await.remove(&record.key);
                return Ok(0);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", record.metadata.relative_path, e);
                return Ok(0);
            }
        };

        let chunks = self.splitter.split(&record.key, &text);

        let previous: HashMap<String, Vec<f32>> = {
            let docs = self.docs.read().await;
            docs.get(&record.key)
                .map(|d| {
                    d.chunks
                        .iter()
                        .map(|c| (c.chunk.hash.clone(), c.vector.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let pending: Vec<String> = chunks
            .iter()
            .filter(|c| !previous.contains_key(&c.hash))
            .map(|c| c.text.clone())
            .collect();
        let mut fresh = if pending.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&pending).await?
        }
        .into_iter();

        let mut indexed = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = match previous.get(&chunk.hash).cloned() {
                Some(v) => v,
                None => fresh
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Embedder returned too few vectors"))?,
            };
            indexed.push(IndexedChunk { chunk, vector });
        }

        let count = indexed.len();
        tracing::debug!(
            path = %record.metadata.relative_path,
            chunks = count,
            embedded = pending.len(),
            "indexed source"
        );
        self.docs.write().await.insert(
            record.key,
            IndexedDocument {
                metadata: record.metadata,
                chunks: indexed,
                indexed_at: Utc::now(),
            },
        );
        Ok(count)
    }

    /// Drop a key. Returns whether it was present.
    pub async fn remove(&self, key: &SourceKey) -> bool {
        self.docs.write().await.remove(key).is_some()
    }

    pub async fn contains(&self, key: &SourceKey) -> bool {
        self.docs.read().await.contains_key(key)
    }

    /// Top-`k` chunks by cosine similarity to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;

        let docs = self.docs.read().await;
        let mut hits: Vec<SearchHit> = docs
            .values()
            .flat_map(|doc| {
                doc.chunks.iter().map(|c| SearchHit {
                    source_key: c.chunk.source_key.clone(),
                    chunk_index: c.chunk.chunk_index,
                    text: c.chunk.text.clone(),
                    score: cosine_similarity(&query_vec, &c.vector),
                    metadata: doc.metadata.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.metadata.relative_path.cmp(&b.metadata.relative_path))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Metadata of every indexed document, ordered by relative path.
    pub async fn list_documents(&self) -> Vec<SourceMetadata> {
        let docs = self.docs.read().await;
        let mut out: Vec<SourceMetadata> = docs.values().map(|d| d.metadata.clone()).collect();
        out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        out
    }

    pub async fn statistics(&self) -> IndexStatistics {
        let docs = self.docs.read().await;
        IndexStatistics {
            file_count: docs.len(),
            chunk_count: docs.values().map(|d| d.chunks.len()).sum(),
            last_modified: docs
                .values()
                .filter_map(|d| d.metadata.modified_at)
                .max()
                .map(|t| t.timestamp()),
            last_indexed: docs.values().map(|d| d.indexed_at).max().map(|t| t.timestamp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::TokenCountSplitter;
    use crate::extract::Utf8Parser;
    use crate::test_util::LetterEmbedder;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many texts were embedded.
    struct CountingEmbedder(AtomicUsize);

    #[async_trait::async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.fetch_add(texts.len(), Ordering::SeqCst);
            LetterEmbedder.embed(texts).await
        }
    }

    fn record(rel: &str, body: &str) -> SourceRecord {
        let path = format!("/data/{}", rel);
        SourceRecord {
            key: SourceKey::from_path(Path::new(&path)),
            data: body.as_bytes().to_vec(),
            metadata: SourceMetadata {
                path,
                relative_path: rel.to_string(),
                size: body.len() as u64,
                modified_at: Some(Utc::now()),
                created_at: None,
                seen_at: Utc::now(),
            },
        }
    }

    fn index_with(embedder: Arc<dyn Embedder>) -> VectorIndex {
        VectorIndex::new(
            Arc::new(Utf8Parser),
            Arc::new(TokenCountSplitter::new(8)),
            embedder,
        )
    }

    #[tokio::test]
    async fn test_search_ranks_similar_chunks_first() {
        let index = index_with(Arc::new(LetterEmbedder));
        index
            .build(vec![
                record("pizza.md", "pizza pizza pizza"),
                record("xyz.md", "xyz qvw"),
            ])
            .await
            .unwrap();

        let hits = index.search("pizza", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.relative_path, "pizza.md");
    }

    #[tokio::test]
    async fn test_upsert_replaces_chunks() {
        let index = index_with(Arc::new(LetterEmbedder));
        let r = record("a.md", "one\n\ntwo\n\nthree");
        let key = r.key.clone();
        index.upsert(r).await.unwrap();
        let before = index.statistics().await.chunk_count;

        index.upsert(record("a.md", "one")).await.unwrap();
        let stats = index.statistics().await;
        assert_eq!(stats.file_count, 1);
        assert!(stats.chunk_count <= before);
        assert!(index.contains(&key).await);
    }

    #[tokio::test]
    async fn test_unchanged_chunks_not_reembedded() {
        let embedder = Arc::new(CountingEmbedder(AtomicUsize::new(0)));
        let index = index_with(embedder.clone());
        let first = "alpha paragraph here\n\nbeta paragraph here";
        index.upsert(record("a.md", first)).await.unwrap();
        let after_first = embedder.0.load(Ordering::SeqCst);
        assert_eq!(after_first, 2);

        let second = "alpha paragraph here\n\ngamma paragraph now";
        index.upsert(record("a.md", second)).await.unwrap();
        assert_eq!(embedder.0.load(Ordering::SeqCst), after_first + 1);
    }

    #[tokio::test]
    async fn test_remove_and_list() {
        let index = index_with(Arc::new(LetterEmbedder));
        let b = record("b.md", "bee");
        let b_key = b.key.clone();
        index.build(vec![b, record("a.md", "ay")]).await.unwrap();

        let rels: Vec<String> = index
            .list_documents()
            .await
            .into_iter()
            .map(|m| m.relative_path)
            .collect();
        assert_eq!(rels, vec!["a.md", "b.md"]);

        assert!(index.remove(&b_key).await);
        assert!(!index.remove(&b_key).await);
        assert_eq!(index.statistics().await.file_count, 1);
    }

    #[tokio::test]
    async fn test_binary_record_not_indexed() {
        let index = index_with(Arc::new(LetterEmbedder));
        let mut r = record("img.md", "");
        r.data = vec![0x89, 0, 0, 1];
        assert_eq!(index.upsert(r).await.unwrap(), 0);
        assert_eq!(index.statistics().await.file_count, 0);
    }

    #[tokio::test]
    async fn test_statistics_empty() {
        let index = index_with(Arc::new(LetterEmbedder));
        let stats = index.statistics().await;
        assert_eq!(
            stats,
            IndexStatistics {
                file_count: 0,
                chunk_count: 0,
                last_modified: None,
                last_indexed: None,
            }
        );
        assert!(index.search("x", 3).await.unwrap().is_empty());
    }
}
