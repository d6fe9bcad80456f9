//! The complete verdict of one verification pass.

use jiff::Timestamp;
use serde::Serialize;

use crate::{compile::CompilerOutput, testing::TestOutput};

/// Compiler diagnostics and test results of one verification attempt.
///
/// Owns both halves, so nothing held elsewhere can change a published
/// verdict. A new pass builds a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckingResult {
    compiler_output: CompilerOutput,
    test_output: TestOutput,
    checked_at: Timestamp,
}

impl CheckingResult {
    pub fn new(compiler_output: CompilerOutput, test_output: TestOutput) -> Self {
        Self {
            compiler_output,
            test_output,
            checked_at: Timestamp::now(),
        }
    }

    /// The verdict for a submission that never reached compilation.
    pub fn not_attempted() -> Self {
        Self::new(CompilerOutput::not_attempted(), TestOutput::not_attempted())
    }

    pub fn compiler_output(&self) -> &CompilerOutput {
        &self.compiler_output
    }

    pub fn test_output(&self) -> &TestOutput {
        &self.test_output
    }

    pub fn checked_at(&self) -> Timestamp {
        self.checked_at
    }

    /// Clean compile and at least one test artifact run, none failing.
    pub fn all_passed(&self) -> bool {
        self.compiler_output.is_clean()
            && self.test_output.did_test()
            && self.test_output.test_count() > 0
            && self.test_output.failed_count() == 0
    }
}
