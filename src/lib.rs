//! # rag-ingest
//!
//! Directory ingestion for retrieval-augmented answering.
//!
//! A data directory is walked, filtered by extension, filename, and
//! exclusion globs, and every surviving file is opened as an independent
//! content source keyed by a hash of its path. The sources are merged into
//! one corpus, indexed in memory, and served over a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────┐   ┌────────┐   ┌────────┐   ┌──────────┐
//! │ discover │──▶│ filter │──▶│ ingest │──▶│ corpus │──▶│  index   │
//! │ walkdir  │   │ globs  │   │ per-key│   │ merge  │   │ embed+kNN│
//! └──────────┘   └────────┘   └────────┘   └────────┘   └────┬─────┘
//!                                                ▲            │
//!                                      watch ────┘            ▼
//!                                   (streaming)        ┌────────────┐
//!                                                      │ rag/server │
//!                                                      └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered settings resolution |
//! | [`error`] | Pipeline error type |
//! | [`models`] | Core data types |
//! | [`discover`] | Recursive file discovery |
//! | [`filter`] | Extension, filename, and exclusion rules |
//! | [`ingest`] | Per-file content sources |
//! | [`corpus`] | Disjoint-key merge |
//! | [`pipeline`] | Startup pipeline wiring |
//! | [`traits`] | Parser, splitter, embedder, and chat seams |
//! | [`extract`] | UTF-8 text parser |
//! | [`chunk`] | Token-count splitter |
//! | [`gemini`] | Gemini HTTP transport with retry |
//! | [`embedding`] | Gemini embedder and cosine similarity |
//! | [`llm`] | Gemini chat client |
//! | [`index`] | In-memory vector index |
//! | [`rag`] | Retrieval-augmented answering |
//! | [`watch`] | Streaming-mode change polling |
//! | [`server`] | HTTP API |
//! | [`client`] | Terminal client for the HTTP API |

pub mod chunk;
pub mod client;
pub mod config;
pub mod corpus;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod filter;
pub mod gemini;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod traits;
pub mod watch;

#[cfg(test)]
pub mod test_util;
