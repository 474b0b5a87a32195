//! Startup pipeline: discover → filter → ingest → merge.
//!
//! Runs once, synchronously, before the server starts. Every stage takes
//! its parameters from the shared [`Settings`]; any stage failure aborts
//! the whole pipeline.

use std::path::PathBuf;

use crate::config::Settings;
use crate::corpus::{Corpus, CorpusMerger};
use crate::discover::FileDiscoverer;
use crate::error::{Error, Result};
use crate::filter::FileFilter;
use crate::ingest::SourceIngestor;
use crate::models::CandidateFile;

/// Absolute data root; relative paths resolve against the working directory.
pub fn data_root(settings: &Settings) -> Result<PathBuf> {
    let path = &settings.data_source.path;
    if path.is_absolute() {
        return Ok(path.clone());
    }
    let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
    Ok(cwd.join(path))
}

/// Discover and filter. Fails when nothing survives filtering.
pub fn select_files(settings: &Settings) -> Result<Vec<CandidateFile>> {
    let root = data_root(settings)?;
    let filter = FileFilter::new(&settings.data_source.file_filtering)?
        .with_file_list(settings.development.show_file_list);

    let discovered = FileDiscoverer::new(&root).discover()?;
    let scanned = discovered.len();
    let selected = filter.apply(discovered);

    if selected.is_empty() {
        return Err(Error::NoCandidateFiles { root, scanned });
    }
    Ok(selected)
}

/// Run the full pipeline and return the merged corpus.
pub fn prepare_corpus(settings: &Settings) -> Result<Corpus> {
    tracing::info!(
        "Loading documents from {}",
        settings.data_source.path.display()
    );
    let files = select_files(settings)?;
    let sources = SourceIngestor::new(settings.data_source.mode).ingest(&files)?;
    CorpusMerger::merge(sources)
}
