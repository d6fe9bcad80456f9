//! Submissions and the students who own them.

use std::{
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    ptr,
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::{fingerprint::ContentFingerprint, verdict::CheckingResult};

/// The owner of a submission. Two students are the same person when their
/// e-mail addresses match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    name: String,
    email: Option<String>,
}

impl Student {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

impl PartialEq for Student {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
    }
}

impl Eq for Student {}

impl Hash for Student {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.email.hash(state);
    }
}

/// One student's fetched source tree and everything derived from it.
///
/// Identity is the content fingerprint: submissions with equal fingerprints
/// are the same submission whatever else differs. Until a fingerprint is
/// recorded a submission is equal only to itself.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    location: PathBuf,
    student: Student,
    fingerprint: Option<ContentFingerprint>,
    plausible: Option<bool>,
    result: Option<CheckingResult>,
    fetched_at: Timestamp,
}

impl Submission {
    pub fn new(location: impl Into<PathBuf>, student: Student) -> Self {
        Self {
            location: location.into(),
            student,
            fingerprint: None,
            plausible: None,
            result: None,
            fetched_at: Timestamp::now(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn student(&self) -> &Student {
        &self.student
    }

    pub fn fingerprint(&self) -> Option<&ContentFingerprint> {
        self.fingerprint.as_ref()
    }

    /// `None` until the plausibility gate has run.
    pub fn plausible(&self) -> Option<bool> {
        self.plausible
    }

    /// `None` until a verification pass has completed.
    pub fn checking_result(&self) -> Option<&CheckingResult> {
        self.result.as_ref()
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub(crate) fn record_fingerprint(&mut self, fingerprint: ContentFingerprint) {
        self.fingerprint = Some(fingerprint);
    }

    pub(crate) fn record_plausibility(&mut self, plausible: bool) {
        self.plausible = Some(plausible);
    }

    /// Replace the verdict with the one from a newer pass.
    pub(crate) fn set_checking_result(&mut self, result: CheckingResult) -> &CheckingResult {
        self.result.insert(result)
    }
}

impl PartialEq for Submission {
    fn eq(&self, other: &Self) -> bool {
        match (&self.fingerprint, &other.fingerprint) {
            (Some(a), Some(b)) => a == b,
            _ => ptr::eq(self, other),
        }
    }
}

impl Eq for Submission {}

impl Hash for Submission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}
