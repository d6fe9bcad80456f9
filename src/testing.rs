//! Isolated test execution.
//!
//! A verifier's test artifacts run against a submission's compiled artifacts
//! inside a disposable [`LoadContext`]. One broken test artifact never stops
//! the others; only the submission's own artifacts failing to load aborts a
//! run.

mod context;
mod executor;
mod naming;
mod runner;

use serde::Serialize;

pub use self::{
    context::{LoadContext, LoadedUnit, Origin},
    executor::TestExecutor,
    naming::QualifiedName,
    runner::{CommandRunner, TestRunner},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    /// Every test in the artifact passed.
    Passed,
    /// The artifact ran and at least one test failed.
    Failed,
    /// The artifact started but produced no usable report.
    Errored,
}

/// Outcome of running one test artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRun {
    pub name: QualifiedName,
    pub status: TestStatus,
    pub run_count: usize,
    pub failure_count: usize,

    /// One human-readable message per failure.
    pub failures: Vec<String>,
}

impl TestRun {
    pub fn passed(name: QualifiedName, run_count: usize) -> Self {
        Self {
            name,
            status: TestStatus::Passed,
            run_count,
            failure_count: 0,
            failures: Vec::new(),
        }
    }

    pub fn failed(
        name: QualifiedName,
        run_count: usize,
        failure_count: usize,
        failures: Vec<String>,
    ) -> Self {
        Self {
            name,
            status: TestStatus::Failed,
            run_count,
            failure_count,
            failures,
        }
    }

    pub fn errored(name: QualifiedName, message: String) -> Self {
        Self {
            name,
            status: TestStatus::Errored,
            run_count: 0,
            failure_count: 1,
            failures: vec![message],
        }
    }

    pub fn was_successful(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Whether testing actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestingState {
    /// Testing was never tried, e.g. because compilation was not clean.
    NotAttempted,
    /// The verifier supplied no tests.
    NoTests,
    /// Tests were run; results may still be empty if every artifact was skipped.
    Ran,
}

/// Results of one test execution attempt.
///
/// Counters are derived once from the results when the value is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutput {
    results: Vec<TestRun>,
    test_count: usize,
    passed_count: usize,
    failed_count: usize,
    state: TestingState,
}

impl TestOutput {
    pub fn not_attempted() -> Self {
        Self::empty(TestingState::NotAttempted)
    }

    pub fn no_tests() -> Self {
        Self::empty(TestingState::NoTests)
    }

    fn empty(state: TestingState) -> Self {
        Self {
            results: Vec::new(),
            test_count: 0,
            passed_count: 0,
            failed_count: 0,
            state,
        }
    }

    pub fn from_runs(results: Vec<TestRun>) -> Self {
        let test_count = results.len();
        let passed_count = results.iter().filter(|r| r.was_successful()).count();
        Self {
            results,
            test_count,
            passed_count,
            failed_count: test_count - passed_count,
            state: TestingState::Ran,
        }
    }

    pub fn results(&self) -> &[TestRun] {
        &self.results
    }

    pub fn test_count(&self) -> usize {
        self.test_count
    }

    pub fn passed_count(&self) -> usize {
        self.passed_count
    }

    pub fn failed_count(&self) -> usize {
        self.failed_count
    }

    pub fn state(&self) -> TestingState {
        self.state
    }

    pub fn did_test(&self) -> bool {
        self.state == TestingState::Ran
    }
}
