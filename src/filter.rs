//! Allow/deny filtering of discovered files.
//!
//! A file is dropped as soon as any exclusion pattern matches it. Each
//! pattern is tried two ways, and either one is enough:
//!
//! 1. **Path suffix.** The pattern's `/`-separated components are matched
//!    right-aligned against the file's absolute path components, one glob
//!    per component (`*` never crosses a separator). `*.log` therefore
//!    matches a `.log` file at any depth, and `*/.git/*` matches any file
//!    directly inside a `.git` directory. A pattern starting with `/` must
//!    match the whole path.
//! 2. **Stripped relative path.** Leading `*` and `/` characters are
//!    removed from the pattern and the remainder must match the entire
//!    root-relative path, with `*` free to cross separators. `*/build/*`
//!    becomes `build/*` and matches everything under a top-level `build/`.
//!
//! The two strategies disagree on some inputs (`build/*` excludes
//! `src/build/x.py` only through the suffix form, and `build/a/b.py` only
//! through the relative form). Both are kept deliberately; the tests pin
//! the current behavior.
//!
//! Pattern syntax is shell-style (`fnmatch`), not full glob syntax: a
//! run of `*` acts as a single `*`, braces and backslashes are literal,
//! and a `[` without a closing `]` is a literal bracket.
//!
//! Files that survive exclusion are kept only if their lower-cased
//! extension is allowed or their exact file name is allowed.

use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::config::FileFilteringSettings;
use crate::error::{Error, Result};
use crate::models::CandidateFile;

/// Outcome of evaluating one file against the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Matched an exclusion pattern (the raw pattern text).
    Excluded(String),
    /// Passed exclusion but neither extension nor name is allowed.
    NotAllowed,
    Included,
}

/// One exclusion pattern compiled for both matching strategies.
#[derive(Debug, Clone)]
pub struct ExclusionPattern {
    raw: String,
    absolute: bool,
    components: Vec<GlobMatcher>,
    relative: Option<GlobMatcher>,
}

impl ExclusionPattern {
    pub fn new(raw: &str) -> Result<Self> {
        let compile = |glob: &str, literal_separator: bool| {
            GlobBuilder::new(&fnmatch_to_glob(glob))
                .literal_separator(literal_separator)
                .backslash_escape(false)
                .build()
                .map(|g| g.compile_matcher())
                .map_err(|source| Error::InvalidPattern {
                    pattern: raw.to_string(),
                    source,
                })
        };

        let components = raw
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .map(|part| compile(part, true))
            .collect::<Result<Vec<_>>>()?;

        let stripped = raw.trim_start_matches(|c: char| c == '*' || c == '/');
        let relative = if stripped.is_empty() {
            None
        } else {
            Some(compile(stripped, false)?)
        };

        Ok(Self {
            raw: raw.to_string(),
            absolute: raw.starts_with('/'),
            components,
            relative,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Right-aligned, per-component match against `path`.
    pub fn matches_suffix(&self, path: &Path) -> bool {
        if self.components.is_empty() {
            return false;
        }
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        if self.absolute {
            if !path.is_absolute() || parts.len() != self.components.len() {
                return false;
            }
        } else if parts.len() < self.components.len() {
            return false;
        }

        parts
            .iter()
            .rev()
            .zip(self.components.iter().rev())
            .all(|(part, glob)| glob.is_match(part))
    }

    /// Whole-string match of the stripped pattern against `relative`.
    pub fn matches_relative(&self, relative: &str) -> bool {
        self.relative
            .as_ref()
            .is_some_and(|glob| glob.is_match(relative))
    }

    pub fn matches(&self, file: &CandidateFile) -> bool {
        self.matches_suffix(&file.path) || self.matches_relative(&file.relative)
    }
}

/// Compiled allow/deny rules.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: HashSet<String>,
    filenames: HashSet<String>,
    exclusions: Vec<ExclusionPattern>,
    show_file_list: bool,
}

impl FileFilter {
    /// Compile the rules. Fails on a malformed exclusion glob.
    pub fn new(rules: &FileFilteringSettings) -> Result<Self> {
        let extensions = rules
            .allowed_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| e.len() > 1)
            .collect();
        let filenames = rules.allowed_filenames.iter().cloned().collect();
        let exclusions = rules
            .excluded_patterns
            .iter()
            .map(|p| ExclusionPattern::new(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            extensions,
            filenames,
            exclusions,
            show_file_list: false,
        })
    }

    /// Log every retained relative path at debug level.
    pub fn with_file_list(mut self, show: bool) -> Self {
        self.show_file_list = show;
        self
    }

    pub fn decide(&self, file: &CandidateFile) -> Decision {
        if let Some(pattern) = self.exclusions.iter().find(|p| p.matches(file)) {
            return Decision::Excluded(pattern.as_str().to_string());
        }
        if self.extensions.contains(&file.extension) || self.filenames.contains(&file.file_name)
        {
            Decision::Included
        } else {
            Decision::NotAllowed
        }
    }

    /// Keep the files the rules admit, sorted by relative path.
    pub fn apply(&self, files: Vec<CandidateFile>) -> Vec<CandidateFile> {
        let total = files.len();
        let mut kept: Vec<CandidateFile> = files
            .into_iter()
            .filter(|f| match self.decide(f) {
                Decision::Included => true,
                Decision::Excluded(pattern) => {
                    tracing::trace!(file = %f.relative, %pattern, "excluded");
                    false
                }
                Decision::NotAllowed => false,
            })
            .collect();
        kept.sort_by(|a, b| a.relative.cmp(&b.relative));

        tracing::info!(
            "Found {} total files, filtered to {} files",
            total,
            kept.len()
        );

        if self.show_file_list && !kept.is_empty() {
            tracing::debug!("Filtered files:");
            for f in &kept {
                tracing::debug!("   - {}", f.relative);
            }
        }

        kept
    }
}

/// Rewrite a shell-style pattern into globset syntax with the same meaning.
fn fnmatch_to_glob(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                while chars.get(i) == Some(&'*') {
                    i += 1;
                }
                out.push('*');
            }
            '{' => out.push_str("[{]"),
            '}' => out.push_str("[}]"),
            '[' => {
                let mut j = i;
                if chars.get(j) == Some(&'!') {
                    j += 1;
                }
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str("[[]");
                    continue;
                }
                let class: String = chars[i..j].iter().collect();
                i = j + 1;
                out.push_str(&bracket_class(&class));
            }
            _ => out.push(c),
        }
    }
    out
}

/// A leading `^` is literal in `fnmatch` but negates in globset.
fn bracket_class(class: &str) -> String {
    let Some(rest) = class.strip_prefix('^') else {
        return format!("[{}]", class);
    };
    if rest.is_empty() {
        return "^".to_string();
    }
    match rest.strip_suffix('-') {
        Some(head) => format!("[{}^-]", head),
        None => format!("[{}^]", rest),
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    const ROOT: &str = "/srv/data";

    fn file(rel: &str) -> CandidateFile {
        CandidateFile::new(Path::new(ROOT), PathBuf::from(ROOT).join(rel))
    }

    fn rules(exts: &[&str], names: &[&str], excluded: &[&str]) -> FileFilteringSettings {
        FileFilteringSettings {
            allowed_extensions: exts.iter().map(|s| s.to_string()).collect(),
            allowed_filenames: names.iter().map(|s| s.to_string()).collect(),
            excluded_patterns: excluded.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn kept(filter: &FileFilter, rels: &[&str]) -> Vec<String> {
        filter
            .apply(rels.iter().map(|r| file(r)).collect())
            .into_iter()
            .map(|f| f.relative)
            .collect()
    }

    #[test]
    fn test_extension_and_filename_allow() {
        let filter = FileFilter::new(&rules(&[".py", "MD"], &["Dockerfile"], &[])).unwrap();
        assert_eq!(
            kept(
                &filter,
                &["a.py", "B.PY", "readme.md", "Dockerfile", "dockerfile", "notes.txt"]
            ),
            vec!["B.PY", "Dockerfile", "a.py", "readme.md"]
        );
    }

    #[test]
    fn test_git_example() {
        let filter = FileFilter::new(&rules(&[".py"], &[], &["*/.git/*"])).unwrap();
        assert_eq!(kept(&filter, &["a.py", "notes.txt", ".git/config"]), vec!["a.py"]);
        assert_eq!(
            filter.decide(&file(".git/hooks.py")),
            Decision::Excluded("*/.git/*".into())
        );
    }

    #[test]
    fn test_exclusion_beats_allow() {
        let filter = FileFilter::new(&rules(&[".py"], &["setup.py"], &["*/setup.py"])).unwrap();
        assert!(matches!(
            filter.decide(&file("pkg/setup.py")),
            Decision::Excluded(_)
        ));
    }

    #[test]
    fn test_suffix_strategy_matches_any_depth() {
        let p = ExclusionPattern::new("*.log").unwrap();
        assert!(p.matches_suffix(Path::new("/srv/data/logs/deep/app.log")));
        // Stripped form is ".log", which only matches a file literally named so.
        assert!(!p.matches_relative("logs/deep/app.log"));
        assert!(p.matches(&file("logs/deep/app.log")));
    }

    #[test]
    fn test_relative_strategy_crosses_separators() {
        let p = ExclusionPattern::new("build/*").unwrap();
        // Suffix form needs `build` as the second-to-last component.
        assert!(!p.matches_suffix(Path::new("/srv/data/build/a/b.py")));
        assert!(p.matches_relative("build/a/b.py"));
        assert!(p.matches(&file("build/a/b.py")));
    }

    #[test]
    fn test_strategies_disagree_on_nested_dir() {
        let p = ExclusionPattern::new("build/*").unwrap();
        assert!(p.matches_suffix(Path::new("/srv/data/src/build/x.py")));
        assert!(!p.matches_relative("src/build/x.py"));
        assert!(p.matches(&file("src/build/x.py")));
    }

    #[test]
    fn test_leading_wildcard_stripped() {
        let p = ExclusionPattern::new("**/node_modules/**").unwrap();
        assert!(p.matches_relative("node_modules/lib/index.js"));
        assert!(!p.matches_relative("web/node_modules/lib/index.js"));
        // The suffix form treats `**` like `*`: exactly one component each side.
        assert!(p.matches_suffix(Path::new("/srv/data/web/node_modules/index.js")));
        assert!(!p.matches_suffix(Path::new("/srv/data/web/node_modules/lib/index.js")));
    }

    #[test]
    fn test_absolute_pattern_requires_full_match() {
        let p = ExclusionPattern::new("/srv/*/secret.md").unwrap();
        assert!(p.matches_suffix(Path::new("/srv/data/secret.md")));
        assert!(!p.matches_suffix(Path::new("/other/srv/data/secret.md")));
    }

    #[test]
    fn test_suffix_is_case_sensitive() {
        let p = ExclusionPattern::new("*.LOG").unwrap();
        assert!(!p.matches_suffix(Path::new("/srv/data/app.log")));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let filter = FileFilter::new(&rules(&[".py"], &[], &[""])).unwrap();
        assert_eq!(kept(&filter, &["a.py"]), vec!["a.py"]);
    }

    #[test]
    fn test_trailing_slash_pattern_matches_everything() {
        // `*/` is a single `*` component in the suffix form.
        let filter = FileFilter::new(&rules(&[".py"], &[], &["*/"])).unwrap();
        assert!(kept(&filter, &["a.py", "pkg/b.py"]).is_empty());
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        let p = ExclusionPattern::new("src/[a-").unwrap();
        assert!(p.matches_relative("src/[a-"));
        assert!(!p.matches_relative("src/a"));
        assert!(p.matches_suffix(Path::new("/srv/data/src/[a-")));
    }

    #[test]
    fn test_reversed_range_rejected() {
        let err = FileFilter::new(&rules(&[".py"], &[], &["[z-a].py"])).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { pattern, .. } if pattern == "[z-a].py"));
    }

    #[test]
    fn test_double_star_acts_as_single_star() {
        let p = ExclusionPattern::new("*/docs/**/*.md").unwrap();
        // Stripped to `docs/*/*.md`: a second separator is required.
        assert!(!p.matches_relative("docs/a.md"));
        assert!(p.matches_relative("docs/x/a.md"));
        assert!(p.matches_relative("docs/x/y/a.md"));
    }

    #[test]
    fn test_braces_are_literal() {
        let p = ExclusionPattern::new("*.{md,txt}").unwrap();
        assert!(!p.matches(&file("notes.md")));
        assert!(!p.matches(&file("notes.txt")));
        assert!(p.matches_suffix(Path::new("/srv/data/notes.{md,txt}")));
        assert!(p.matches_relative(".{md,txt}"));
    }

    #[test]
    fn test_backslash_is_literal() {
        let p = ExclusionPattern::new("a\\*.py").unwrap();
        assert!(p.matches_relative("a\\b.py"));
        assert!(!p.matches_relative("a*.py"));
        assert!(!p.matches_relative("ab.py"));
    }

    #[test]
    fn test_bracket_classes() {
        let p = ExclusionPattern::new("[!a]*.py").unwrap();
        assert!(p.matches_relative("b.py"));
        assert!(!p.matches_relative("a.py"));

        let p = ExclusionPattern::new("[^x].py").unwrap();
        assert!(p.matches_relative("^.py"));
        assert!(p.matches_relative("x.py"));
        assert!(!p.matches_relative("y.py"));

        let p = ExclusionPattern::new("[]]*").unwrap();
        assert!(p.matches_relative("]notes.py"));
    }

    #[test]
    fn test_decision_independent_of_rule_order() {
        let a = FileFilter::new(&rules(&[".md", ".py"], &["Makefile", "LICENSE"], &["*.lock"]))
            .unwrap();
        let b = FileFilter::new(&rules(&[".py", ".md"], &["LICENSE", "Makefile"], &["*.lock"]))
            .unwrap();
        let files = ["a.py", "b.md", "Makefile", "LICENSE", "c.txt", "Cargo.lock"];
        assert_eq!(kept(&a, &files), kept(&b, &files));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_of_apply(filter: &FileFilter, rels: &[&str]) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || kept(filter, rels));
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_file_list_logged_in_sorted_order() {
        let filter = FileFilter::new(&rules(&[".py"], &[], &[]))
            .unwrap()
            .with_file_list(true);
        let logs = logs_of_apply(&filter, &["b.py", "a.py", "c.txt"]);
        assert!(logs.contains("Found 3 total files, filtered to 2 files"));
        assert!(logs.contains("Filtered files:"));
        let a = logs.find("   - a.py").expect("a.py listed");
        let b = logs.find("   - b.py").expect("b.py listed");
        assert!(a < b);
        assert!(!logs.contains("c.txt"));
    }

    #[test]
    fn test_file_list_off_by_default() {
        let filter = FileFilter::new(&rules(&[".py"], &[], &[])).unwrap();
        let logs = logs_of_apply(&filter, &["b.py", "a.py"]);
        assert!(logs.contains("filtered to 2 files"));
        assert!(!logs.contains("Filtered files:"));
        assert!(!logs.contains("   - a.py"));
    }

    #[test]
    fn test_nothing_allowed_yields_empty() {
        let filter = FileFilter::new(&rules(&[".rs"], &[], &[])).unwrap();
        assert!(kept(&filter, &["a.py", "b.md"]).is_empty());
    }
}
