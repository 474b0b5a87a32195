//! Terminal client for a running answer server.
//!
//! Posts prompts to `/v1/pw_ai_answer` and turns whatever JSON comes back
//! into an [`AnswerView`]. Servers built on different frameworks wrap the
//! answer differently, so [`interpret`] accepts:
//!
//! - a bare JSON string
//! - an object carrying the answer under the first present key of
//!   `result`, `answer`, `response`, `text`, with optional `sources`
//!
//! Anything else is reported to the user instead of being printed raw.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Where the client looks when no URL is given.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Shown when the server cannot be reached or answers with an error status.
pub const UNAVAILABLE_MESSAGE: &str = "Sorry, the system is currently unavailable.";

const ANSWER_KEYS: [&str; 4] = ["result", "answer", "response", "text"];
const ASK_TIMEOUT_SECS: u64 = 30;
const HEALTH_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ClientError {
    #[error("{}", UNAVAILABLE_MESSAGE)]
    Unavailable,

    #[error("Empty response.")]
    EmptyAnswer,

    #[error("Unrecognized response from the server.")]
    UnrecognizedResponse,
}

/// An answer ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerView {
    pub answer: String,
    pub sources: Vec<Value>,
}

impl AnswerView {
    /// Answer text followed by a numbered source list.
    pub fn render(&self) -> String {
        let mut out = self.answer.clone();
        if !self.sources.is_empty() {
            out.push_str("\n\nSources:");
            for (i, source) in self.sources.iter().enumerate() {
                out.push_str(&format!("\n  {}. {}", i + 1, describe_source(source)));
            }
        }
        out
    }
}

fn describe_source(source: &Value) -> String {
    ["relative_path", "path"]
        .iter()
        .find_map(|k| source.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| source.to_string())
}

/// Extract the answer and sources from a response body.
pub fn interpret(value: Value) -> Result<AnswerView, ClientError> {
    match value {
        Value::String(answer) => non_empty(answer, Vec::new()),
        Value::Object(mut map) => {
            let answer = ANSWER_KEYS
                .iter()
                .find_map(|k| map.remove(*k))
                .ok_or(ClientError::UnrecognizedResponse)?;
            let answer = match answer {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            let sources = match map.remove("sources") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            non_empty(answer, sources)
        }
        _ => Err(ClientError::UnrecognizedResponse),
    }
}

fn non_empty(answer: String, sources: Vec<Value>) -> Result<AnswerView, ClientError> {
    if answer.trim().is_empty() {
        return Err(ClientError::EmptyAnswer);
    }
    Ok(AnswerView { answer, sources })
}

pub struct AnswerClient {
    http: reqwest::Client,
    base_url: String,
}

impl AnswerClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn ask(&self, prompt: &str) -> Result<AnswerView, ClientError> {
        let body = self
            .post_json(
                "/v1/pw_ai_answer",
                &serde_json::json!({ "prompt": prompt }),
                ASK_TIMEOUT_SECS,
            )
            .await?;
        interpret(body)
    }

    /// Probe the server by listing its documents.
    pub async fn health(&self) -> Result<Value, ClientError> {
        self.post_json("/v2/list_documents", &serde_json::json!({}), HEALTH_TIMEOUT_SECS)
            .await
    }

    async fn post_json(&self, path: &str, body: &Value, timeout: u64) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(timeout))
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("API connection error: {}", e);
                return Err(ClientError::Unavailable);
            }
        };
        resp.json().await.map_err(|e| {
            tracing::warn!("Invalid JSON from {}: {}", url, e);
            ClientError::UnrecognizedResponse
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_response() {
        let view = interpret(json!("42")).unwrap();
        assert_eq!(view.answer, "42");
        assert!(view.sources.is_empty());
    }

    #[test]
    fn test_key_priority() {
        let view = interpret(json!({ "text": "t", "response": "r", "answer": "a" })).unwrap();
        assert_eq!(view.answer, "a");
        let view = interpret(json!({ "result": "x", "answer": "a" })).unwrap();
        assert_eq!(view.answer, "x");
    }

    #[test]
    fn test_sources_kept() {
        let view = interpret(json!({
            "response": "yes",
            "sources": [{ "relative_path": "a.md" }, { "other": 1 }]
        }))
        .unwrap();
        assert_eq!(view.sources.len(), 2);
        let rendered = view.render();
        assert!(rendered.starts_with("yes\n\nSources:"));
        assert!(rendered.contains("1. a.md"));
        assert!(rendered.contains("2. {\"other\":1}"));
    }

    #[test]
    fn test_empty_answers() {
        assert_eq!(interpret(json!("")), Err(ClientError::EmptyAnswer));
        assert_eq!(interpret(json!({ "answer": null })), Err(ClientError::EmptyAnswer));
        assert_eq!(interpret(json!({ "response": "  " })), Err(ClientError::EmptyAnswer));
    }

    #[test]
    fn test_unrecognized_shapes() {
        assert_eq!(
            interpret(json!({ "foo": "bar" })),
            Err(ClientError::UnrecognizedResponse)
        );
        assert_eq!(interpret(json!([1, 2])), Err(ClientError::UnrecognizedResponse));
        assert_eq!(interpret(json!(null)), Err(ClientError::UnrecognizedResponse));
    }

    #[test]
    fn test_non_string_answer_is_stringified() {
        assert_eq!(interpret(json!({ "result": 7 })).unwrap().answer, "7");
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AnswerClient::new(&format!("http://{}/", addr)).unwrap();
        assert_eq!(client.base_url(), format!("http://{}", addr));
        assert_eq!(client.ask("hi").await, Err(ClientError::Unavailable));
        assert_eq!(client.health().await, Err(ClientError::Unavailable));
        assert_eq!(ClientError::Unavailable.to_string(), UNAVAILABLE_MESSAGE);
    }
}
