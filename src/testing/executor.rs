//! Running a verifier's test suite against a submission.

use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use ignore::WalkBuilder;
use regex::Regex;

use super::{CommandRunner, LoadContext, QualifiedName, TestOutput, TestRun, TestRunner};
use crate::{
    config::ExecutorSettings,
    error::{Error, Result},
};

pub struct TestExecutor<R> {
    runner: R,
    compiled_suffix: String,
    test_source_suffix: String,
    namespace: Regex,
}

impl TestExecutor<CommandRunner> {
    /// An executor that runs each test artifact through the configured
    /// command template.
    pub fn from_settings(settings: &ExecutorSettings) -> Result<Self> {
        let runner = CommandRunner::new(settings.runner.clone())?;
        Self::new(runner, settings)
    }
}

impl<R: TestRunner> TestExecutor<R> {
    pub fn new(runner: R, settings: &ExecutorSettings) -> Result<Self> {
        Ok(Self {
            runner,
            compiled_suffix: settings.compiled_suffix.clone(),
            test_source_suffix: settings.test_source_suffix.clone(),
            namespace: settings.namespace_regex()?,
        })
    }

    /// Run every test under `verifier_root` against the artifacts under
    /// `compiled_root`.
    ///
    /// An absent or empty verifier root is not an error: the result reports
    /// that no testing occurred. A submission artifact that cannot be loaded
    /// fails the whole run. A test artifact that cannot be loaded or run is
    /// logged and left out of the results.
    pub fn run(&self, compiled_root: &Path, verifier_root: Option<&Path>) -> Result<TestOutput> {
        let Some(test_root) = verifier_root.filter(|root| has_entries(root)) else {
            tracing::info!(compiled = %compiled_root.display(), "no verifier tests; nothing to run");
            return Ok(TestOutput::no_tests());
        };
        if !compiled_root.is_dir() {
            return Err(Error::not_found(compiled_root, "compiled submission root does not exist"));
        }

        let mut context = LoadContext::open(test_root, compiled_root, &self.compiled_suffix)?;
        self.load_submission(&mut context, compiled_root)
            .inspect_err(|e| {
                tracing::error!(
                    compiled = %compiled_root.display(),
                    error = %e,
                    "submission artifacts failed to load; testing aborted"
                );
            })?;

        let runs = self.run_tests(&mut context, test_root);
        if let Err(e) = context.close() {
            tracing::warn!(error = %e, "failed to release load context");
        }

        let output = TestOutput::from_runs(runs);
        tracing::info!(
            tests = %test_root.display(),
            total = output.test_count(),
            passed = output.passed_count(),
            failed = output.failed_count(),
            "test execution finished"
        );
        Ok(output)
    }

    fn load_submission(&self, context: &mut LoadContext, compiled_root: &Path) -> Result<()> {
        let (artifacts, errors) = find_files(compiled_root, &self.compiled_suffix);
        if let Some(e) = errors.into_iter().next() {
            return Err(Error::Io(std::io::Error::other(e)));
        }

        for path in &artifacts {
            let name = QualifiedName::from_relative_path(compiled_root, path)?;
            context.load_at(&name, path)?;
        }
        tracing::debug!(count = artifacts.len(), "loaded submission artifacts");
        Ok(())
    }

    fn run_tests(&self, context: &mut LoadContext, test_root: &Path) -> Vec<TestRun> {
        let (sources, errors) = find_files(test_root, &self.test_source_suffix);
        for e in errors {
            tracing::warn!(error = %e, "skipping unreadable part of the verifier tests");
        }

        let mut runs = Vec::new();
        for source in sources {
            let name = match QualifiedName::from_source(&source, &self.namespace) {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(source = %source.display(), error = %e, "skipping unreadable test source");
                    continue;
                }
            };

            match panic::catch_unwind(AssertUnwindSafe(|| self.run_one(context, &name))) {
                Ok(Ok(run)) => runs.push(run),
                Ok(Err(e)) => {
                    tracing::warn!(name = %name, error = %e, "skipping test artifact");
                }
                Err(_) => {
                    tracing::warn!(name = %name, "test artifact panicked; skipping");
                }
            }
        }
        runs
    }

    fn run_one(&self, context: &mut LoadContext, name: &QualifiedName) -> Result<TestRun> {
        let unit = context.load(name)?;
        self.runner.run(context, &unit)
    }
}

fn has_entries(root: &Path) -> bool {
    fs::read_dir(root).is_ok_and(|mut entries| entries.next().is_some())
}

/// Files under `root` with extension `suffix`, in file-name order, plus any
/// traversal errors met on the way.
fn find_files(root: &Path, suffix: &str) -> (Vec<PathBuf>, Vec<ignore::Error>) {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(Ord::cmp)
        .build();

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                let matches = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(suffix));
                if is_file && matches {
                    files.push(entry.into_path());
                }
            }
            Err(e) => errors.push(e),
        }
    }
    (files, errors)
}
