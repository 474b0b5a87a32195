//! Test helpers shared across module tests.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::*;
use crate::traits::{ChatModel, Embedder};

/// Minimal valid settings rooted at `root`.
pub fn settings_for(root: &Path, exts: &[&str], excluded: &[&str]) -> Settings {
    Settings {
        llm: LlmSettings {
            model_name: "gemini-2.0-flash".into(),
            temperature: 0.0,
            max_tokens: 256,
            max_retries: 0,
        },
        embedding: EmbeddingSettings {
            model_name: "text-embedding-004".into(),
        },
        text_processing: TextProcessingSettings {
            max_tokens_per_chunk: 100,
        },
        data_source: DataSourceSettings {
            path: root.to_path_buf(),
            mode: IngestMode::Static,
            file_filtering: FileFilteringSettings {
                allowed_extensions: exts.iter().map(|s| s.to_string()).collect(),
                allowed_filenames: Vec::new(),
                excluded_patterns: excluded.iter().map(|s| s.to_string()).collect(),
            },
            poll_interval_secs: 5,
        },
        rag: RagSettings {
            search_topk: 3,
            prompt_template: "{context}\n{query}".into(),
        },
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 8000,
            with_cache: false,
        },
        development: DevelopmentSettings::default(),
    }
}

/// Letter-frequency embedder: texts sharing letters score as similar.
pub struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.chars().filter(|c| c.is_ascii_alphabetic()) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Chat model that answers with a fixed reply and records every prompt.
#[derive(Default)]
pub struct RecordingChat {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
