//! Retrieval-augmented answering.
//!
//! Retrieves the top `rag.search_topk` chunks for a prompt, renders them
//! into `rag.prompt_template` and asks the chat model. The template uses
//! two placeholders: `{context}` and `{query}`.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::config::RagSettings;
use crate::index::{SearchHit, VectorIndex};
use crate::models::SourceMetadata;
use crate::traits::ChatModel;

/// Answer plus the metadata of the documents it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub response: String,
    pub sources: Vec<SourceMetadata>,
}

pub struct RagAnswerer {
    index: Arc<VectorIndex>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
    template: String,
}

impl RagAnswerer {
    pub fn new(index: Arc<VectorIndex>, chat: Arc<dyn ChatModel>, settings: &RagSettings) -> Self {
        Self {
            index,
            chat,
            top_k: settings.search_topk,
            template: settings.prompt_template.clone(),
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub async fn answer(&self, prompt: &str) -> Result<RagAnswer> {
        let hits = self.index.search(prompt, self.top_k).await?;
        let rendered = render_prompt(&self.template, &hits, prompt);
        tracing::debug!(hits = hits.len(), "answering with retrieved context");

        let response = self.chat.complete(&rendered).await?;
        Ok(RagAnswer {
            response,
            sources: unique_sources(&hits),
        })
    }
}

/// Substitute `{context}` and `{query}` in `template`.
pub fn render_prompt(template: &str, hits: &[SearchHit], query: &str) -> String {
    let context = hits
        .iter()
        .map(|h| format!("[{}]\n{}", h.metadata.relative_path, h.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    // Park `{query}` first so placeholders inside retrieved chunks stay literal.
    template
        .replace("{query}", "\u{0}QUERY\u{0}")
        .replace("{context}", &context)
        .replace("\u{0}QUERY\u{0}", query)
}

/// Source metadata in hit order, one entry per document.
fn unique_sources(hits: &[SearchHit]) -> Vec<SourceMetadata> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|h| seen.insert(h.source_key.clone()))
        .map(|h| h.metadata.clone())
        .collect()
}
