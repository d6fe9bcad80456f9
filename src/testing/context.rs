//! Disposable, scoped loading context.
//!
//! A [`LoadContext`] resolves qualified names against exactly two roots, the
//! verifier's test artifacts first and the submission's compiled artifacts
//! second. Every unit it loads stays open until the context is closed or
//! dropped, and its private scratch directory goes with it. Nothing is shared
//! between contexts.

use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use tempfile::TempDir;

use super::QualifiedName;
use crate::error::{Error, Result};

/// Which root a unit was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Verifier,
    Submission,
}

/// An artifact resolved and held open by a context.
#[derive(Debug)]
pub struct LoadedUnit {
    pub name: QualifiedName,
    pub path: PathBuf,
    pub origin: Origin,
    pub size: u64,
    _handle: File,
}

#[derive(Debug)]
pub struct LoadContext {
    roots: [(PathBuf, Origin); 2],
    suffix: String,
    units: BTreeMap<QualifiedName, Arc<LoadedUnit>>,
    scratch: TempDir,
}

impl LoadContext {
    /// Open a context over `test_root` and `submission_root`, resolving
    /// artifacts with the given file extension.
    pub fn open(test_root: &Path, submission_root: &Path, suffix: &str) -> Result<Self> {
        let scratch = tempfile::Builder::new().prefix("intake-run-").tempdir()?;
        tracing::debug!(
            tests = %test_root.display(),
            submission = %submission_root.display(),
            scratch = %scratch.path().display(),
            "opened load context"
        );

        Ok(Self {
            roots: [
                (test_root.to_path_buf(), Origin::Verifier),
                (submission_root.to_path_buf(), Origin::Submission),
            ],
            suffix: suffix.to_string(),
            units: BTreeMap::new(),
            scratch,
        })
    }

    /// Resolve `name`, searching the test root before the submission root.
    ///
    /// Loading the same name twice returns the unit loaded the first time.
    pub fn load(&mut self, name: &QualifiedName) -> Result<Arc<LoadedUnit>> {
        if let Some(unit) = self.units.get(name) {
            return Ok(Arc::clone(unit));
        }

        let rel = name.to_relative_path(&self.suffix);
        let (path, origin) = self
            .roots
            .iter()
            .map(|(root, origin)| (root.join(&rel), *origin))
            .find(|(path, _)| path.is_file())
            .ok_or_else(|| Error::load_failure(name, "not found on the search path"))?;

        self.insert(name, path, origin)
    }

    /// Load an artifact already found at `path` under `name`.
    ///
    /// A unit of the same name in the test root still takes precedence.
    pub fn load_at(&mut self, name: &QualifiedName, path: &Path) -> Result<Arc<LoadedUnit>> {
        if let Some(unit) = self.units.get(name) {
            return Ok(Arc::clone(unit));
        }

        let shadow = self.test_root().join(name.to_relative_path(&self.suffix));
        if shadow.is_file() {
            return self.insert(name, shadow, Origin::Verifier);
        }

        let origin = if path.starts_with(self.test_root()) {
            Origin::Verifier
        } else {
            Origin::Submission
        };
        self.insert(name, path.to_path_buf(), origin)
    }

    fn insert(&mut self, name: &QualifiedName, path: PathBuf, origin: Origin) -> Result<Arc<LoadedUnit>> {
        let handle = File::open(&path).map_err(|e| Error::load_failure(name, e))?;
        let size = handle.metadata().map_err(|e| Error::load_failure(name, e))?.len();
        if size == 0 {
            return Err(Error::load_failure(name, "artifact is empty"));
        }

        let unit = Arc::new(LoadedUnit {
            name: name.clone(),
            path,
            origin,
            size,
            _handle: handle,
        });
        self.units.insert(name.clone(), Arc::clone(&unit));
        Ok(unit)
    }

    /// The two roots joined in platform search-path form, test root first.
    pub fn search_path(&self) -> Result<OsString> {
        env::join_paths(self.roots.iter().map(|(root, _)| root))
            .map_err(|e| Error::Configuration(format!("root cannot join a search path: {e}")))
    }

    pub fn test_root(&self) -> &Path {
        &self.roots[0].0
    }

    pub fn submission_root(&self) -> &Path {
        &self.roots[1].0
    }

    /// Private working directory for anything run inside this context.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn loaded_count(&self) -> usize {
        self.units.len()
    }

    /// Release every held unit and remove the scratch directory.
    ///
    /// Dropping the context releases the same resources; `close` only adds
    /// reporting of a failed cleanup.
    pub fn close(self) -> Result<()> {
        let Self { units, scratch, .. } = self;
        let released = units.len();
        drop(units);
        scratch.close()?;
        tracing::debug!(released, "closed load context");
        Ok(())
    }
}
