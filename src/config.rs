//! Intake configuration.
//!
//! Loaded from `<config dir>/intake/config.toml` unless a path is given.
//! Every key is optional; a missing default file means all defaults.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    archive::DEFAULT_MAX_UNCOMPRESSED_BYTES,
    compile::CleanPolicy,
    error::{Error, Result},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub archive: ArchiveSettings,

    /// Extra or overriding language patterns, keyed by language identifier.
    pub languages: BTreeMap<String, String>,

    pub compile: CompileSettings,
    pub executor: ExecutorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ArchiveSettings {
    /// Levels of nested archives to unpack. Signed so that a negative value
    /// in the file is reported rather than failing to parse.
    pub depth_limit: i64,
    pub staging_dir: PathBuf,
    pub max_uncompressed_bytes: u64,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            depth_limit: 2,
            staging_dir: env::temp_dir().join("intake-staging"),
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompileSettings {
    pub clean_policy: CleanPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorSettings {
    /// Extension of compiled artifacts under the submission root.
    pub compiled_suffix: String,

    /// Extension of test sources under the verifier root.
    pub test_source_suffix: String,

    /// Header pattern whose first capture group is the namespace.
    pub namespace_pattern: String,

    /// Command template run once per test artifact.
    ///
    /// Placeholders: `{name}`, `{search-path}`, `{artifact}`.
    pub runner: Vec<String>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            compiled_suffix: "class".to_string(),
            test_source_suffix: "java".to_string(),
            namespace_pattern: r"^\s*package\s+([^,;\s]+)\s*;".to_string(),
            runner: ["java", "-cp", "{search-path}", "org.junit.runner.JUnitCore", "{name}"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl ExecutorSettings {
    pub fn namespace_regex(&self) -> Result<Regex> {
        Regex::new(&self.namespace_pattern)
            .map_err(|e| Error::Configuration(format!("invalid namespace-pattern: {e}")))
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::not_found(path, "config file does not exist"));
                }
                Self::read(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::read(&path)?,
                _ => Self::default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Configuration(format!("invalid config: {e}")))
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("invalid config at {}: {e}", path.display())))
    }

    /// Reject settings that would only fail later, mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.archive.depth_limit < 0 {
            return Err(Error::Configuration(format!(
                "archive.depth-limit must be >= 0, got {}",
                self.archive.depth_limit
            )));
        }
        if self.archive.staging_dir.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "archive.staging-dir must not be empty".to_string(),
            ));
        }
        for (language, pattern) in &self.languages {
            Regex::new(pattern).map_err(|e| {
                Error::Configuration(format!("invalid pattern for language `{language}`: {e}"))
            })?;
        }
        if self.executor.runner.is_empty() {
            return Err(Error::Configuration(
                "executor.runner must name a command".to_string(),
            ));
        }
        self.executor.namespace_regex()?;
        Ok(())
    }

    /// The default config file path: `<config dir>/intake/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("intake").join("config.toml"))
    }
}
