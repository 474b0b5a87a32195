//! # rag-ingest CLI
//!
//! Builds a retrieval corpus from a local directory and serves answers
//! over HTTP, plus a small terminal client for a running server.
//!
//! ## Usage
//!
//! ```bash
//! rag-ingest [--root DIR] [--config FILE] [--set section.field=value]... <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-ingest check` | Resolve settings and print them as TOML |
//! | `rag-ingest scan` | List the files that would be ingested |
//! | `rag-ingest serve` | Ingest, index, and start the HTTP server |
//! | `rag-ingest ask [PROMPT]` | Ask a running server (REPL without a prompt) |
//! | `rag-ingest health` | Check that a running server responds |
//!
//! ## Examples
//!
//! ```bash
//! # Preview which files are picked up
//! rag-ingest scan --data-path ./docs
//!
//! # Serve on another port with debug logging
//! RAG_SERVER__PORT=9000 rag-ingest -v serve
//!
//! # One-shot question
//! rag-ingest ask "What does the ingest module do?"
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use rag_ingest::chunk::TokenCountSplitter;
use rag_ingest::client::{AnswerClient, DEFAULT_API_URL};
use rag_ingest::config::{IngestMode, Settings, SettingsResolver, SettingsSources};
use rag_ingest::embedding::GeminiEmbedder;
use rag_ingest::extract::Utf8Parser;
use rag_ingest::index::VectorIndex;
use rag_ingest::llm::GeminiChat;
use rag_ingest::pipeline;
use rag_ingest::rag::RagAnswerer;
use rag_ingest::server;
use rag_ingest::watch::SourceWatcher;

/// Log filter used unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_FILTER: &str = "rag_ingest=info";
const DEBUG_LOG_FILTER: &str = "rag_ingest=debug";

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// rag-ingest: directory ingestion and retrieval-augmented answering.
///
/// Settings are layered: `--set` overrides, then `RAG_*` environment
/// variables, then `.env`, then the TOML config file, then secrets files.
#[derive(Parser)]
#[command(
    name = "rag-ingest",
    about = "Directory ingestion and retrieval-augmented answering",
    version
)]
struct Cli {
    /// Project root; relative config, `.env`, and secrets paths resolve here.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (TOML). Defaults to `RAG_CONFIG_FILE`, then
    /// `config/settings.toml` under the root.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Explicit override, highest precedence. Repeatable.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Shorthand for `--set data_source.path=...`.
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    /// Shorthand for `--set server.port=...`.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve settings and print the effective configuration.
    Check,

    /// Discover and filter files; print the retained relative paths.
    Scan,

    /// Ingest the data directory, build the index, and serve answers.
    Serve,

    /// Ask a running server. Starts an interactive prompt when no
    /// question is given.
    Ask {
        /// Question to ask.
        prompt: Option<String>,

        /// Server base URL.
        #[arg(long, env = "RAG_API_URL", default_value = DEFAULT_API_URL)]
        url: String,
    },

    /// Check that a running server responds.
    Health {
        /// Server base URL.
        #[arg(long, env = "RAG_API_URL", default_value = DEFAULT_API_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_handle = init_tracing(cli.verbose);

    if let Err(e) = run(cli, log_handle).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) -> FilterHandle {
    let filter = if verbose {
        EnvFilter::new(DEBUG_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .init();
    handle
}

fn build_resolver(cli: &Cli) -> anyhow::Result<SettingsResolver> {
    let mut sources = SettingsSources::from_process(&cli.root);
    sources.config_file = cli.config.clone();
    if let Some(path) = &cli.data_path {
        sources.set("data_source.path", path.to_string_lossy());
    }
    if let Some(port) = cli.port {
        sources.set("server.port", port.to_string());
    }
    for assignment in &cli.overrides {
        sources.set_assignment(assignment)?;
    }
    Ok(SettingsResolver::new(sources))
}

/// Resolve settings once and apply `development.debug_logging`.
fn load_settings(cli: &Cli, log_handle: &FilterHandle) -> anyhow::Result<Arc<Settings>> {
    let resolver = build_resolver(cli)?;
    let settings = resolver.get()?;
    tracing::debug!(
        "Settings resolved from {}",
        resolver.sources().config_path().display()
    );

    if settings.development.debug_logging && !cli.verbose {
        log_handle
            .modify(|f| *f = EnvFilter::new(DEBUG_LOG_FILTER))
            .context("failed to enable debug logging")?;
    }
    Ok(settings)
}

async fn run(cli: Cli, log_handle: FilterHandle) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Check => {
            let settings = load_settings(&cli, &log_handle)?;
            print!("{}", settings.to_toml_string()?);
        }
        Commands::Scan => {
            let settings = load_settings(&cli, &log_handle)?;
            for file in pipeline::select_files(&settings)? {
                println!("{}", file.relative);
            }
        }
        Commands::Serve => {
            let settings = load_settings(&cli, &log_handle)?;
            serve(&settings).await?;
        }
        Commands::Ask { prompt, url } => ask(url, prompt.as_deref()).await?,
        Commands::Health { url } => health(url).await?,
    }

    Ok(())
}

/// Ingest, index, optionally watch, then serve until shutdown.
async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let embedder = Arc::new(GeminiEmbedder::from_env(&settings.embedding)?);
    let chat = Arc::new(GeminiChat::from_env(&settings.llm)?.with_cache(settings.server.with_cache));

    let corpus = pipeline::prepare_corpus(settings)?;
    let index = Arc::new(VectorIndex::new(
        Arc::new(Utf8Parser),
        Arc::new(TokenCountSplitter::new(
            settings.text_processing.max_tokens_per_chunk,
        )),
        embedder,
    ));
    index.build(corpus.snapshot()).await?;

    if settings.data_source.mode == IngestMode::Streaming {
        SourceWatcher::new(
            corpus.sources().to_vec(),
            index.clone(),
            Duration::from_secs(settings.data_source.poll_interval_secs),
        )
        .spawn();
    }

    let answerer = Arc::new(RagAnswerer::new(index, chat, &settings.rag));
    server::run_server(settings, answerer).await
}

async fn ask(url: &str, prompt: Option<&str>) -> anyhow::Result<()> {
    let client = AnswerClient::new(url)?;

    if let Some(prompt) = prompt {
        let view = client.ask(prompt).await?;
        println!("{}", view.render());
        return Ok(());
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Ask me anything about the files. Type 'exit' to quit.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match client.ask(line).await {
            Ok(view) => println!("{}\n", view.render()),
            Err(e) => println!("{}\n", e),
        }
    }
    Ok(())
}

async fn health(url: &str) -> anyhow::Result<()> {
    let client = AnswerClient::new(url)?;
    let documents = client
        .health()
        .await
        .context("System connection is not available")?;
    let count = documents.as_array().map(|d| d.len()).unwrap_or(0);
    println!("System is healthy: {} documents indexed at {}", count, client.base_url());
    Ok(())
}
