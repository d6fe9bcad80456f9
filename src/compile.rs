//! Compiler diagnostics for one compilation attempt.
//!
//! Compilation itself is external. A stage that drives a compiler fills a
//! [`CompilerOutputBuilder`] and finishes it into an immutable
//! [`CompilerOutput`], which is all the rest of the pipeline ever sees.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What counts as a clean compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanPolicy {
    /// Any error or warning makes the compile unclean.
    #[default]
    ErrorsAndWarnings,
    /// Only errors make the compile unclean.
    ErrorsOnly,
}

/// Accumulates diagnostics while a compiler runs.
///
/// Lists are append-only and every flag starts out false, meaning "not yet
/// attempted".
#[derive(Debug, Clone, Default)]
pub struct CompilerOutputBuilder {
    errors: Vec<String>,
    warnings: Vec<String>,
    infos: Vec<String>,
    invoked: bool,
    stream_complete: bool,
}

impl CompilerOutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(message.into());
        self
    }

    pub fn add_warning(&mut self, message: impl Into<String>) -> &mut Self {
        self.warnings.push(message.into());
        self
    }

    pub fn add_info(&mut self, message: impl Into<String>) -> &mut Self {
        self.infos.push(message.into());
        self
    }

    /// The compiler process was actually started.
    pub fn mark_invoked(&mut self) -> &mut Self {
        self.invoked = true;
        self
    }

    /// The compiler's output stream was read to its end.
    pub fn mark_stream_complete(&mut self) -> &mut Self {
        self.stream_complete = true;
        self
    }

    /// Freeze the accumulated diagnostics.
    pub fn finish(self, policy: CleanPolicy) -> CompilerOutput {
        let clean = self.invoked
            && self.stream_complete
            && self.errors.is_empty()
            && (policy == CleanPolicy::ErrorsOnly || self.warnings.is_empty());

        CompilerOutput {
            errors: self.errors,
            warnings: self.warnings,
            infos: self.infos,
            invoked: self.invoked,
            stream_complete: self.stream_complete,
            clean,
        }
    }
}

/// Immutable diagnostics of one compilation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerOutput {
    errors: Vec<String>,
    warnings: Vec<String>,
    infos: Vec<String>,
    invoked: bool,
    stream_complete: bool,
    clean: bool,
}

impl CompilerOutput {
    /// No compilation was attempted: empty lists, every flag false.
    pub fn not_attempted() -> Self {
        CompilerOutputBuilder::new().finish(CleanPolicy::default())
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn infos(&self) -> &[String] {
        &self.infos
    }

    pub fn invoked(&self) -> bool {
        self.invoked
    }

    pub fn stream_complete(&self) -> bool {
        self.stream_complete
    }

    /// Clean under the policy in force when the output was finished. Tests
    /// only run against clean compiles.
    pub fn is_clean(&self) -> bool {
        self.clean
    }
}

/// Sort raw `javac` output lines into errors and warnings.
///
/// Lines accumulate into a pending note until a caret line (`^` alone)
/// closes it as one error. `Note: ` and `javac: ` lines are warnings.
/// Anything still pending at the end is kept as an info. An unsupported
/// flag means the invocation itself was misconfigured.
pub fn split_javac_output<I, S>(lines: I, output: &mut CompilerOutputBuilder) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut note = String::new();

    for line in lines {
        let line = line.as_ref();
        if line.starts_with("javac: invalid flag:") {
            return Err(Error::Configuration(format!("compiler rejected a flag: {line}")));
        } else if line.trim() == "^" {
            output.add_error(note.trim_end());
            note.clear();
        } else if line.starts_with("Note: ") || line.starts_with("javac: ") {
            output.add_warning(line);
        } else {
            note.push_str(line);
            note.push('\n');
        }
    }

    if !note.trim().is_empty() {
        output.add_info(note.trim_end());
    }
    Ok(())
}
