//! Collaborator traits consumed by the index and the answering service.
//!
//! The corpus pipeline stops at a merged [`Corpus`](crate::corpus::Corpus).
//! Everything after that (turning bytes into text, splitting, embedding,
//! and generating answers) goes through these traits so the concrete
//! backends can be swapped or faked in tests.
//!
//! ```text
//!   SourceRecord ──▶ DocumentParser ──▶ Splitter ──▶ Embedder ──▶ VectorIndex
//!                                                                   │
//!                                         prompt ──▶ RagAnswerer ◀──┘
//!                                                        │
//!                                                        ▼
//!                                                    ChatModel
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, SourceKey, SourceMetadata};

// ═══════════════════════════════════════════════════════════════════════
// Parsing and splitting
// ═══════════════════════════════════════════════════════════════════════

/// Turns a record's raw bytes into plain text.
///
/// Returning `Ok(None)` means "nothing to index" (for example a binary
/// payload); the record is skipped without a warning.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, data: &[u8], metadata: &SourceMetadata) -> Result<Option<String>>;
}

/// Splits parsed text into chunks small enough to embed.
pub trait Splitter: Send + Sync {
    /// Chunks carry contiguous indices starting at 0.
    fn split(&self, key: &SourceKey, text: &str) -> Vec<Chunk>;
}

// ═══════════════════════════════════════════════════════════════════════
// Model clients
// ═══════════════════════════════════════════════════════════════════════

/// Produces embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Embed a batch; one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Generates a completion for a fully rendered prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}
