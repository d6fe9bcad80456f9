//! Error taxonomy shared by every stage of the pipeline.

use std::{io, path::PathBuf};

/// Errors that can occur while taking in, identifying, or verifying a submission.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required path is missing or empty.
    #[error("not found: {}: {reason}", path.display())]
    NotFound { path: PathBuf, reason: String },

    /// Content is not the expected structured format (e.g. not a valid archive).
    #[error("format error: {0}")]
    Format(String),

    /// A required setting was never supplied or is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No suffix pattern is registered for the requested language.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// A dynamically named artifact could not be resolved or executed.
    #[error("failed to load `{name}`: {reason}")]
    LoadFailure { name: String, reason: String },
}

impl Error {
    pub(crate) fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn load_failure(name: impl ToString, reason: impl ToString) -> Self {
        Self::LoadFailure {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
