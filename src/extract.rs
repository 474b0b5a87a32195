//! Plain-text extraction for ingested records.
//!
//! The default parser accepts anything that looks like text and decodes it
//! as UTF-8 (lossily, so a stray invalid byte does not drop the document).
//! Payloads containing NUL bytes in their first block are treated as binary
//! and skipped.

use anyhow::Result;

use crate::models::SourceMetadata;
use crate::traits::DocumentParser;

/// How many leading bytes are inspected for NULs.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Decodes text files; skips binary ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Parser;

impl DocumentParser for Utf8Parser {
    fn parse(&self, data: &[u8], metadata: &SourceMetadata) -> Result<Option<String>> {
        if looks_binary(data) {
            tracing::debug!(path = %metadata.relative_path, "skipping binary payload");
            return Ok(None);
        }
        let text = String::from_utf8_lossy(data);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&*text);
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }
}

fn looks_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_SNIFF_BYTES)].contains(&0)
}
