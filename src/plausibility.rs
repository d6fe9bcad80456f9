//! Plausibility gate: does a submission contain any file of the expected language?
//!
//! A cheap admissibility heuristic, not a validation. The walk stops at the
//! first matching file, and unreadable subtrees are logged and treated as
//! containing no match.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Suffix patterns for the languages supported out of the box.
const DEFAULT_LANGUAGES: [(&str, &str); 4] = [
    ("java", r"^.+\.java$"),
    ("c", r"^.+\.c$"),
    ("cpp", r"^.+\.cpp$"),
    ("haskell", r"^.+\.l?hs$"),
];

/// Maps language identifiers to case-insensitive file-name patterns.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    patterns: BTreeMap<String, Regex>,
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        let mut registry = Self {
            patterns: BTreeMap::new(),
        };
        for (language, pattern) in DEFAULT_LANGUAGES {
            if let Ok(regex) = compile_pattern(pattern) {
                registry.patterns.insert(language.to_string(), regex);
            }
        }
        registry
    }
}

impl LanguageRegistry {
    /// The default languages, extended or overridden by `overrides`.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut registry = Self::default();
        for (language, pattern) in overrides {
            registry.register(language, pattern)?;
        }
        Ok(registry)
    }

    /// Register (or replace) the pattern for a language.
    ///
    /// Identifiers are matched case-insensitively.
    pub fn register(&mut self, language: &str, pattern: &str) -> Result<()> {
        let regex = compile_pattern(pattern).map_err(|e| {
            Error::Configuration(format!("invalid pattern for language `{language}`: {e}"))
        })?;
        self.patterns.insert(language.to_ascii_lowercase(), regex);
        Ok(())
    }

    /// Look up the pattern for a language.
    pub fn pattern(&self, language: &str) -> Result<&Regex> {
        self.patterns
            .get(&language.to_ascii_lowercase())
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }
}

fn compile_pattern(pattern: &str) -> core::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// What one plausibility walk saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// The first file whose name matched, if any.
    pub first_match: Option<PathBuf>,

    /// Number of files inspected before the walk ended.
    pub files_visited: usize,
}

impl WalkOutcome {
    pub fn found(&self) -> bool {
        self.first_match.is_some()
    }
}

/// A single-use depth-first walk looking for one matching file.
///
/// `walk` consumes the walker: once a match has been found the walker
/// cannot be pointed at another tree, so one check never leaks into the next.
pub struct SubmissionWalker {
    pattern: Regex,
    first_match: Option<PathBuf>,
    files_visited: usize,
}

impl SubmissionWalker {
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            first_match: None,
            files_visited: 0,
        }
    }

    /// Walk `root` in file-name order, stopping at the first match.
    pub fn walk(mut self, root: &Path) -> WalkOutcome {
        let walker = WalkBuilder::new(root)
            .standard_filters(false) // Submissions are judged as fetched, ignore files included.
            .sort_by_file_name(Ord::cmp)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        root = %root.display(),
                        error = %e,
                        "skipping unreadable part of submission during plausibility check"
                    );
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            self.files_visited += 1;
            if self.matches(entry.path()) {
                self.first_match = Some(entry.into_path());
                break;
            }
        }

        WalkOutcome {
            first_match: self.first_match,
            files_visited: self.files_visited,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.pattern.is_match(&name.to_string_lossy()))
    }
}

/// Whether `tree` contains at least one file of `language`, at any depth.
///
/// Fails only when `language` has no registered pattern; traversal problems
/// degrade to "no match" for the affected subtree.
pub fn is_plausible(tree: &Path, language: &str, registry: &LanguageRegistry) -> Result<bool> {
    let pattern = registry.pattern(language)?.clone();
    let outcome = SubmissionWalker::new(pattern).walk(tree);

    tracing::info!(
        tree = %tree.display(),
        language,
        plausible = outcome.found(),
        files_visited = outcome.files_visited,
        "plausibility checked"
    );
    Ok(outcome.found())
}
