//! Gemini chat client.
//!
//! Sends a rendered prompt to `generateContent` using the `llm.*` settings
//! and returns the concatenated text parts of the first candidate. When
//! `server.with_cache` is on, completions are memoized in memory keyed by
//! a SHA-256 of model + prompt.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::LlmSettings;
use crate::gemini::{model_id, GeminiClient};
use crate::traits::ChatModel;

pub struct GeminiChat {
    client: GeminiClient,
    model: String,
    temperature: f64,
    max_tokens: u32,
    cache: Option<Mutex<HashMap<String, String>>>,
}

impl GeminiChat {
    pub fn new(client: GeminiClient, settings: &LlmSettings) -> Self {
        Self {
            client,
            model: model_id(&settings.model_name).to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            cache: None,
        }
    }

    /// Client keyed from `GEMINI_API_KEY`, retrying `llm.max_retries` times.
    pub fn from_env(settings: &LlmSettings) -> Result<Self> {
        Ok(Self::new(
            GeminiClient::from_env(settings.max_retries)?,
            settings,
        ))
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    fn cache_key(&self, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let guard = cache.lock().ok()?;
        guard.get(key).cloned()
    }

    fn store(&self, key: String, value: &str) {
        if let Some(cache) = &self.cache {
            if let Ok(mut guard) = cache.lock() {
                guard.insert(key, value.to_string());
            }
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let key = self.cache_key(prompt);
        if let Some(hit) = self.cached(&key) {
            tracing::debug!("chat cache hit");
            return Ok(hit);
        }

        let json = self
            .client
            .call(&self.model, "generateContent", &self.request_body(prompt))
            .await?;
        let text = parse_completion(&json)?;
        self.store(key, &text);
        Ok(text)
    }
}

/// Join the text parts of `candidates[0].content.parts`.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array());

    let Some(parts) = parts else {
        if let Some(reason) = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
        {
            bail!("Prompt blocked by the model: {}", reason);
        }
        bail!("Invalid Gemini response: missing candidates");
    };

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}
