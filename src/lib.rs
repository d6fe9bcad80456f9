//! Submission intake, integrity, and verification.
//!
//! Takes an untrusted, externally fetched submission archive through a
//! fixed sequence of stages:
//!
//! - [`archive`]: depth-bounded extraction of nested archives.
//! - [`fingerprint`]: a stable content identity for deduplication.
//! - [`plausibility`]: a cheap check that the expected language is present.
//! - [`testing`]: verifier tests run against the compiled submission inside
//!   a disposable loading context.
//! - [`verdict`]: compiler and test results merged into one immutable value.
//!
//! [`pipeline::Pipeline`] strings the stages together for one submission.

pub mod archive;
pub mod compile;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod plausibility;
pub mod submission;
pub mod testing;
pub mod verdict;

pub use error::{Error, Result};
