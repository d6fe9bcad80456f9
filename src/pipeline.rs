//! The intake and verification pipeline for one submission.
//!
//! Extraction, fingerprinting and the plausibility gate run in `intake`.
//! Compilation (external) and test execution run in `verify`. Each
//! submission gets its own working tree and loading context, so separate
//! submissions can run on separate threads without coordination.

use std::path::Path;

use crate::{
    archive::{ArchiveHandler, ZipHandler},
    compile::{CleanPolicy, CompilerOutput},
    config::Config,
    error::Result,
    fingerprint::fingerprint,
    plausibility::{LanguageRegistry, is_plausible},
    submission::{Student, Submission},
    testing::{CommandRunner, TestExecutor, TestOutput, TestRunner},
    verdict::CheckingResult,
};

/// A compiler invocation service. It compiles the tree at `source` and
/// reports what happened; it never fails, since failure is itself a
/// diagnostic.
pub trait Compiler {
    fn compile(&self, source: &Path, policy: CleanPolicy) -> CompilerOutput;
}

pub struct Pipeline<A = ZipHandler, R = CommandRunner> {
    archive: A,
    languages: LanguageRegistry,
    clean_policy: CleanPolicy,
    executor: TestExecutor<R>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ZipHandler::from_settings(&config.archive)?,
            LanguageRegistry::with_overrides(&config.languages)?,
            config.compile.clean_policy,
            TestExecutor::from_settings(&config.executor)?,
        ))
    }
}

impl<A: ArchiveHandler, R: TestRunner> Pipeline<A, R> {
    pub fn new(
        archive: A,
        languages: LanguageRegistry,
        clean_policy: CleanPolicy,
        executor: TestExecutor<R>,
    ) -> Self {
        Self {
            archive,
            languages,
            clean_policy,
            executor,
        }
    }

    /// Unpack `archive` into `tree` and identify the result.
    ///
    /// Any failure here means the submission never enters verification.
    pub fn intake(
        &self,
        archive: &Path,
        tree: &Path,
        student: Student,
        language: &str,
    ) -> Result<Submission> {
        // Reject unknown languages before touching the disk.
        self.languages.pattern(language)?;

        self.archive.extract(archive, tree)?;

        let mut submission = Submission::new(tree, student);
        submission.record_fingerprint(fingerprint(tree)?);
        submission.record_plausibility(is_plausible(tree, language, &self.languages)?);

        tracing::info!(
            student = submission.student().name(),
            tree = %tree.display(),
            fingerprint = ?submission.fingerprint().map(ToString::to_string),
            plausible = ?submission.plausible(),
            "submission taken in"
        );
        Ok(submission)
    }

    /// Compile and test `submission`, recording a fresh verdict on it.
    ///
    /// An implausible submission still gets a verdict, marked as not
    /// attempted. Tests only run after a clean compile. A test run that
    /// fails outright is logged and reported as not attempted.
    pub fn verify<'s, C: Compiler>(
        &self,
        submission: &'s mut Submission,
        compiler: &C,
        compiled_root: &Path,
        verifier_root: Option<&Path>,
    ) -> &'s CheckingResult {
        let result = if submission.plausible() == Some(true) {
            let compiler_output = compiler.compile(submission.location(), self.clean_policy);
            let test_output = if compiler_output.is_clean() {
                self.executor
                    .run(compiled_root, verifier_root)
                    .unwrap_or_else(|e| {
                        tracing::error!(
                            tree = %submission.location().display(),
                            error = %e,
                            "testing failed"
                        );
                        TestOutput::not_attempted()
                    })
            } else {
                tracing::info!(
                    tree = %submission.location().display(),
                    errors = compiler_output.errors().len(),
                    warnings = compiler_output.warnings().len(),
                    "compile not clean; skipping tests"
                );
                TestOutput::not_attempted()
            };
            CheckingResult::new(compiler_output, test_output)
        } else {
            tracing::info!(
                tree = %submission.location().display(),
                "submission not plausible; verification not attempted"
            );
            CheckingResult::not_attempted()
        };

        tracing::info!(
            student = submission.student().name(),
            clean = result.compiler_output().is_clean(),
            tests = result.test_output().test_count(),
            passed = result.test_output().passed_count(),
            "verification finished"
        );
        submission.set_checking_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        cell::Cell,
        fs,
        io::{Cursor, Write},
    };

    use tempfile::TempDir;
    use zip::{ZipWriter, write::SimpleFileOptions};

    use crate::{
        compile::CompilerOutputBuilder,
        config::ExecutorSettings,
        error::Error,
        testing::{LoadContext, LoadedUnit, TestRun, TestingState},
    };

    struct PassingRunner;

    impl TestRunner for PassingRunner {
        fn run(&self, _context: &LoadContext, unit: &LoadedUnit) -> Result<TestRun> {
            Ok(TestRun::passed(unit.name.clone(), 1))
        }
    }

    /// Reports a fixed set of diagnostics and counts invocations.
    struct FakeCompiler {
        warnings: Vec<String>,
        calls: Cell<usize>,
    }

    impl FakeCompiler {
        fn clean() -> Self {
            Self {
                warnings: Vec::new(),
                calls: Cell::new(0),
            }
        }
    }

    impl Compiler for FakeCompiler {
        fn compile(&self, _source: &Path, policy: CleanPolicy) -> CompilerOutput {
            self.calls.set(self.calls.get() + 1);
            let mut builder = CompilerOutputBuilder::new();
            builder.mark_invoked().mark_stream_complete();
            for warning in &self.warnings {
                builder.add_warning(warning.as_str());
            }
            builder.finish(policy)
        }
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        fs::write(path, writer.finish().unwrap().into_inner()).unwrap();
    }

    fn pipeline(work: &Path, policy: CleanPolicy) -> Pipeline<ZipHandler, PassingRunner> {
        let mut archive = ZipHandler::new();
        archive.set_depth_limit(2).unwrap();
        archive.set_staging_dir(work.join("staging")).unwrap();
        let executor = TestExecutor::new(PassingRunner, &ExecutorSettings::default()).unwrap();
        Pipeline::new(archive, LanguageRegistry::default(), policy, executor)
    }

    /// Compiled submission plus one verifier test, under `work`.
    fn compiled_fixture(work: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let compiled = work.join("bin");
        let tests = work.join("tests");
        fs::create_dir_all(&compiled).unwrap();
        fs::create_dir_all(&tests).unwrap();
        fs::write(compiled.join("Main.class"), "main").unwrap();
        fs::write(tests.join("MainTest.java"), "public class MainTest {}\n").unwrap();
        fs::write(tests.join("MainTest.class"), "test").unwrap();
        (compiled, tests)
    }

    #[test]
    fn intake_fingerprints_and_gates() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("src/Main.java", "class Main {}")]);

        let submission = pipeline(work.path(), CleanPolicy::default())
            .intake(&archive, &work.path().join("tree"), Student::new("Ada"), "java")
            .unwrap();

        assert!(submission.fingerprint().is_some());
        assert_eq!(submission.plausible(), Some(true));
        assert!(submission.checking_result().is_none());
    }

    #[test]
    fn unknown_language_fails_before_extraction() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("main.c", "int main() {}")]);
        let tree = work.path().join("tree");

        let err = pipeline(work.path(), CleanPolicy::default())
            .intake(&archive, &tree, Student::new("Ada"), "cobol")
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedLanguage(_)));
        assert!(!tree.exists());
    }

    #[test]
    fn implausible_submission_gets_not_attempted_verdict() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("main.c", "int main() {}")]);
        let pipeline = pipeline(work.path(), CleanPolicy::default());

        let mut submission = pipeline
            .intake(&archive, &work.path().join("tree"), Student::new("Ada"), "java")
            .unwrap();
        let compiler = FakeCompiler::clean();
        let (compiled, tests) = compiled_fixture(work.path());

        let result = pipeline.verify(&mut submission, &compiler, &compiled, Some(&tests));

        assert!(!result.compiler_output().invoked());
        assert_eq!(result.test_output().state(), TestingState::NotAttempted);
        assert_eq!(compiler.calls.get(), 0);
        assert!(submission.checking_result().is_some());
    }

    #[test]
    fn clean_compile_runs_tests() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("Main.java", "class Main {}")]);
        let pipeline = pipeline(work.path(), CleanPolicy::default());

        let mut submission = pipeline
            .intake(&archive, &work.path().join("tree"), Student::new("Ada"), "java")
            .unwrap();
        let (compiled, tests) = compiled_fixture(work.path());

        let result = pipeline.verify(&mut submission, &FakeCompiler::clean(), &compiled, Some(&tests));

        assert!(result.compiler_output().is_clean());
        assert_eq!(result.test_output().test_count(), 1);
        assert!(result.all_passed());
    }

    #[test]
    fn warnings_block_tests_only_under_strict_policy() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("Main.java", "class Main {}")]);
        let (compiled, tests) = compiled_fixture(work.path());
        let compiler = FakeCompiler {
            warnings: vec!["Note: Main.java uses unchecked operations.".to_string()],
            calls: Cell::new(0),
        };

        let strict = pipeline(work.path(), CleanPolicy::ErrorsAndWarnings);
        let mut submission = strict
            .intake(&archive, &work.path().join("strict"), Student::new("Ada"), "java")
            .unwrap();
        let result = strict.verify(&mut submission, &compiler, &compiled, Some(&tests));
        assert!(!result.test_output().did_test());

        let lenient = pipeline(work.path(), CleanPolicy::ErrorsOnly);
        let mut submission = lenient
            .intake(&archive, &work.path().join("lenient"), Student::new("Ada"), "java")
            .unwrap();
        let result = lenient.verify(&mut submission, &compiler, &compiled, Some(&tests));
        assert!(result.test_output().did_test());
    }

    #[test]
    fn fatal_test_failure_is_reported_not_propagated() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("Main.java", "class Main {}")]);
        let pipeline = pipeline(work.path(), CleanPolicy::default());
        let mut submission = pipeline
            .intake(&archive, &work.path().join("tree"), Student::new("Ada"), "java")
            .unwrap();
        let (compiled, tests) = compiled_fixture(work.path());
        fs::write(compiled.join("Broken.class"), "").unwrap();

        let result = pipeline.verify(&mut submission, &FakeCompiler::clean(), &compiled, Some(&tests));

        assert!(result.compiler_output().is_clean());
        assert_eq!(result.test_output().state(), TestingState::NotAttempted);
        assert!(result.test_output().results().is_empty());
    }

    #[test]
    fn identical_uploads_are_the_same_submission() {
        let work = TempDir::new().unwrap();
        let archive = work.path().join("sub.zip");
        write_zip(&archive, &[("Main.java", "class Main {}")]);
        let pipeline = pipeline(work.path(), CleanPolicy::default());

        let first = pipeline
            .intake(&archive, &work.path().join("one"), Student::new("Ada"), "java")
            .unwrap();
        let second = pipeline
            .intake(&archive, &work.path().join("two"), Student::new("Grace"), "java")
            .unwrap();

        assert_eq!(first, second);
    }
}
