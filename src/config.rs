//! Layered settings resolution.
//!
//! Settings come from five layers. From highest to lowest precedence:
//!
//! | Layer | Source |
//! |-------|--------|
//! | explicit | `--set section.field=value` and other CLI overrides |
//! | env | process environment, `RAG_` prefix, `__` nested delimiter |
//! | dotenv | `.env` in the project root (or `RAG_ENV_FILE`) |
//! | config file | TOML file, `RAG_CONFIG_FILE` or `config/settings.toml` |
//! | secrets | one file per key in `RAG_SECRETS_DIR` |
//!
//! Tables merge key by key; scalars and arrays from a higher layer replace
//! the lower value outright. Raw string values (env, dotenv, secrets,
//! explicit) are coerced to the type already present at that path in the
//! layers beneath, falling back to inference when no layer defines it.
//!
//! The merged tree is deserialized into [`Settings`] and range-checked by
//! [`Settings::validate`]. A [`SettingsResolver`] memoizes the first
//! successful resolution; `main` builds exactly one and hands the
//! resulting `Arc<Settings>` to every component.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use toml::{Table, Value};

use crate::error::{Error, Result};

/// Prefix shared by every environment variable the resolver reads.
pub const ENV_PREFIX: &str = "RAG_";

/// Separator between nested field names in env keys and secret file names.
pub const ENV_NESTED_DELIMITER: &str = "__";

/// Config file used when neither `--config` nor `RAG_CONFIG_FILE` is given.
pub const DEFAULT_CONFIG_FILE: &str = "config/settings.toml";

const CONFIG_FILE_VAR: &str = "RAG_CONFIG_FILE";
const ENV_FILE_VAR: &str = "RAG_ENV_FILE";
const SECRETS_DIR_VAR: &str = "RAG_SECRETS_DIR";

// ---------------------------------------------------------------------------
// Settings schema
// ---------------------------------------------------------------------------

/// Fully resolved, validated runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub text_processing: TextProcessingSettings,
    pub data_source: DataSourceSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
    #[serde(default)]
    pub development: DevelopmentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProcessingSettings {
    pub max_tokens_per_chunk: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSettings {
    pub path: PathBuf,
    pub mode: IngestMode,
    pub file_filtering: FileFilteringSettings,
    /// How often streaming mode re-checks source files for changes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

/// Whether sources are captured once or keep emitting updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    Streaming,
    Static,
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Streaming => f.write_str("streaming"),
            IngestMode::Static => f.write_str("static"),
        }
    }
}

/// Allow/deny rules applied to discovered files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileFilteringSettings {
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub allowed_filenames: Vec<String>,
    #[serde(default)]
    pub excluded_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSettings {
    pub search_topk: usize,
    pub prompt_template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub with_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DevelopmentSettings {
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub show_file_list: bool,
}

impl Settings {
    /// Range- and pattern-check every field that serde alone cannot.
    pub fn validate(&self) -> Result<()> {
        if self.llm.model_name.trim().is_empty() {
            return Err(Error::validation("llm.model_name must not be empty"));
        }
        let t = self.llm.temperature;
        if !t.is_finite() || !(0.0..=2.0).contains(&t) {
            return Err(Error::validation(format!(
                "llm.temperature must be in [0.0, 2.0], got {}",
                t
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::validation("llm.max_tokens must be > 0"));
        }

        if self.embedding.model_name.trim().is_empty() {
            return Err(Error::validation("embedding.model_name must not be empty"));
        }

        if self.text_processing.max_tokens_per_chunk == 0 {
            return Err(Error::validation(
                "text_processing.max_tokens_per_chunk must be > 0",
            ));
        }

        if self.data_source.path.as_os_str().is_empty() {
            return Err(Error::validation("data_source.path must not be empty"));
        }
        if self.data_source.poll_interval_secs == 0 {
            return Err(Error::validation(
                "data_source.poll_interval_secs must be > 0",
            ));
        }

        if self.rag.search_topk == 0 {
            return Err(Error::validation("rag.search_topk must be > 0"));
        }

        if self.server.host.trim().is_empty() {
            return Err(Error::validation("server.host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::validation("server.port must be in (0, 65535]"));
        }

        Ok(())
    }

    /// `host:port` string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Render the effective settings as TOML.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Layer inputs
// ---------------------------------------------------------------------------

/// Everything the resolver reads, captured up front so resolution is a pure
/// function of these inputs plus file contents.
#[derive(Debug, Clone, Default)]
pub struct SettingsSources {
    /// Base for relative config, dotenv, and secrets paths.
    pub project_root: PathBuf,
    /// Config file chosen on the command line; wins over `RAG_CONFIG_FILE`.
    pub config_file: Option<PathBuf>,
    /// Snapshot of the environment.
    pub env: Vec<(String, String)>,
    /// Explicit `dotted.key = raw value` overrides.
    pub overrides: Vec<(String, String)>,
}

impl SettingsSources {
    /// Capture the current process environment.
    pub fn from_process(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            config_file: None,
            env: utf8_pairs(std::env::vars_os()),
            overrides: Vec::new(),
        }
    }

    /// Add an explicit override, e.g. `set("server.port", "9000")`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Parse a `section.field=value` argument into an override.
    pub fn set_assignment(&mut self, assignment: &str) -> Result<&mut Self> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            Error::validation(format!(
                "override '{}' must have the form section.field=value",
                assignment
            ))
        })?;
        Ok(self.set(key.trim(), value))
    }

    fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.project_root.join(p)
        }
    }

    /// Path of the TOML config file this resolution will read.
    pub fn config_path(&self) -> PathBuf {
        match (&self.config_file, self.env_var(CONFIG_FILE_VAR)) {
            (Some(p), _) => self.resolve_path(p),
            (None, Some(p)) if !p.is_empty() => self.resolve_path(p),
            _ => self.resolve_path(DEFAULT_CONFIG_FILE),
        }
    }

    fn dotenv_path(&self) -> PathBuf {
        match self.env_var(ENV_FILE_VAR) {
            Some(p) if !p.is_empty() => self.resolve_path(p),
            _ => self.resolve_path(".env"),
        }
    }

    fn secrets_dir(&self) -> Option<PathBuf> {
        self.env_var(SECRETS_DIR_VAR)
            .filter(|p| !p.is_empty())
            .map(|p| self.resolve_path(p))
    }
}

/// Keep the pairs whose name and value are both valid UTF-8.
fn utf8_pairs(vars: impl Iterator<Item = (OsString, OsString)>) -> Vec<(String, String)> {
    vars.filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves [`Settings`] once and shares the result.
///
/// Concurrent callers of [`SettingsResolver::get`] all observe the same
/// `Arc<Settings>`; the first caller performs the resolution.
pub struct SettingsResolver {
    sources: SettingsSources,
    resolved: OnceLock<Arc<Settings>>,
    init: Mutex<()>,
}

impl SettingsResolver {
    pub fn new(sources: SettingsSources) -> Self {
        Self {
            sources,
            resolved: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn sources(&self) -> &SettingsSources {
        &self.sources
    }

    /// Return the memoized settings, resolving them on first use.
    ///
    /// A failed resolution is not cached; the next call retries.
    pub fn get(&self) -> Result<Arc<Settings>> {
        if let Some(settings) = self.resolved.get() {
            return Ok(settings.clone());
        }
        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(settings) = self.resolved.get() {
            return Ok(settings.clone());
        }
        let settings = Arc::new(resolve(&self.sources)?);
        let _ = self.resolved.set(settings.clone());
        Ok(settings)
    }
}

/// Resolve settings from scratch, bypassing any memoization.
pub fn resolve(sources: &SettingsSources) -> Result<Settings> {
    let config_path = sources.config_path();
    let file_table = read_config_file(&config_path)?;

    // Secrets sit beneath the config file; their coercion hints come from it.
    let mut tree = Table::new();
    if let Some(dir) = sources.secrets_dir() {
        for (path, raw, label) in read_secrets(&dir)? {
            let hint = lookup(&file_table, &path);
            apply(&mut tree, &path, &raw, hint.cloned(), &label)?;
        }
    }
    merge_tables(&mut tree, file_table);

    let dotenv_path = sources.dotenv_path();
    if dotenv_path.is_file() {
        let pairs = read_dotenv(&dotenv_path)?;
        apply_prefixed(&mut tree, &pairs, "dotenv entry")?;
    }

    apply_prefixed(&mut tree, &sources.env, "environment variable")?;

    for (key, raw) in &sources.overrides {
        let path: Vec<String> = key
            .split('.')
            .map(|s| s.trim().to_ascii_lowercase())
            .collect();
        if path.iter().any(|s| s.is_empty()) {
            return Err(Error::validation(format!("invalid override key '{}'", key)));
        }
        let hint = lookup(&tree, &path).cloned();
        apply(&mut tree, &path, raw, hint, &format!("override {}", key))?;
    }

    let settings: Settings = Value::Table(tree)
        .try_into()
        .map_err(|e: toml::de::Error| Error::validation(e.message().trim().to_string()))?;
    settings.validate()?;

    tracing::debug!(
        config_file = %config_path.display(),
        data_path = %settings.data_source.path.display(),
        mode = %settings.data_source.mode,
        "settings resolved"
    );

    Ok(settings)
}

fn read_config_file(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::config_file(path, e))?;
    content
        .parse::<Table>()
        .map_err(|e| Error::config_file(path, e.message().trim()))
}

fn read_dotenv(path: &Path) -> Result<Vec<(String, String)>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| Error::config_file(path, e))?;
    let mut pairs = Vec::new();
    for item in iter {
        pairs.push(item.map_err(|e| Error::config_file(path, e))?);
    }
    Ok(pairs)
}

/// Secret files named `llm__model_name` (optionally `rag_llm__model_name`).
fn read_secrets(dir: &Path) -> Result<Vec<(Vec<String>, String, String)>> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "secrets directory does not exist, skipping");
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut secrets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        let name = name
            .strip_prefix(&ENV_PREFIX.to_ascii_lowercase())
            .unwrap_or(&name)
            .to_string();
        let Some(key_path) = split_nested(&name) else {
            continue;
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        secrets.push((key_path, raw.trim().to_string(), format!("secret {}", name)));
    }
    // Shallow keys first so a nested secret refines a whole-section one.
    secrets.sort_by_key(|(path, _, _)| path.len());
    Ok(secrets)
}

/// Apply every `RAG_`-prefixed pair, shallow keys first.
fn apply_prefixed(tree: &mut Table, pairs: &[(String, String)], label: &str) -> Result<()> {
    let mut assignments: Vec<(Vec<String>, &str, &str)> = pairs
        .iter()
        .filter_map(|(key, raw)| {
            let stripped = strip_prefix_ci(key, ENV_PREFIX)?;
            let path = split_nested(&stripped.to_ascii_lowercase())?;
            Some((path, key.as_str(), raw.as_str()))
        })
        .collect();
    assignments.sort_by_key(|(path, _, _)| path.len());

    for (path, key, raw) in assignments {
        let hint = lookup(tree, &path).cloned();
        apply(tree, &path, raw, hint, &format!("{} {}", label, key))?;
    }
    Ok(())
}

fn strip_prefix_ci<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let head = key.get(..prefix.len())?;
    if key.len() > prefix.len() && head.eq_ignore_ascii_case(prefix) {
        key.get(prefix.len()..)
    } else {
        None
    }
}

fn split_nested(key: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = key
        .split(ENV_NESTED_DELIMITER)
        .map(|s| s.to_string())
        .collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

fn apply(
    tree: &mut Table,
    path: &[String],
    raw: &str,
    hint: Option<Value>,
    label: &str,
) -> Result<()> {
    let value = coerce(raw, hint.as_ref())
        .map_err(|msg| Error::validation(format!("{}: {}", label, msg)))?;
    set_path(tree, path, value);
    Ok(())
}

fn lookup<'a>(table: &'a Table, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let value = table.get(first)?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        Value::Table(t) => lookup(t, rest),
        _ => None,
    }
}

fn set_path(table: &mut Table, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        match (table.get_mut(first), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                table.insert(first.clone(), value);
            }
        }
        return;
    }
    let entry = table
        .entry(first.clone())
        .or_insert_with(|| Value::Table(Table::new()));
    if !entry.is_table() {
        *entry = Value::Table(Table::new());
    }
    if let Value::Table(child) = entry {
        set_path(child, rest, value);
    }
}

/// Deep-merge `upper` into `base`; `upper` wins on conflicts.
fn merge_tables(base: &mut Table, upper: Table) {
    for (key, value) in upper {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn coerce(raw: &str, hint: Option<&Value>) -> std::result::Result<Value, String> {
    let trimmed = raw.trim();
    match hint {
        Some(Value::String(_)) | Some(Value::Datetime(_)) => Ok(Value::String(raw.to_string())),
        Some(Value::Integer(_)) => trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| trimmed.parse::<f64>().map(Value::Float))
            .map_err(|_| format!("expected an integer, got '{}'", raw)),
        Some(Value::Float(_)) => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("expected a number, got '{}'", raw)),
        Some(Value::Boolean(_)) => {
            parse_bool(trimmed).ok_or_else(|| format!("expected a boolean, got '{}'", raw))
        }
        Some(Value::Array(_)) | Some(Value::Table(_)) => json_to_toml(trimmed),
        None => Ok(infer(raw)),
    }
}

fn parse_bool(s: &str) -> Option<Value> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(Value::Boolean(true)),
        "false" | "0" | "no" | "off" => Some(Value::Boolean(false)),
        _ => None,
    }
}

fn json_to_toml(s: &str) -> std::result::Result<Value, String> {
    let json: serde_json::Value =
        serde_json::from_str(s).map_err(|e| format!("expected JSON, got '{}': {}", s, e))?;
    Value::try_from(json).map_err(|e| format!("unsupported JSON value '{}': {}", s, e))
}

fn infer(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(v) = json_to_toml(trimmed) {
            return v;
        }
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::Float(f);
    }
    match trimmed {
        "true" | "false" => Value::Boolean(trimmed == "true"),
        _ => Value::String(raw.to_string()),
    }
}
