//! Archive extraction and packing.
//!
//! An [`ArchiveHandler`] unpacks a possibly nested submission archive into a
//! working tree and packs trees back into archives. Nested archives are
//! unpacked only up to the configured depth limit; anything deeper is left
//! in place as an opaque file.

mod zip;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

pub use self::zip::{DEFAULT_MAX_UNCOMPRESSED_BYTES, ZipHandler};

/// A format-specific unpacker/packer.
///
/// Both the depth limit and the staging directory must be configured before
/// `extract` is called; an unconfigured handler refuses to run.
pub trait ArchiveHandler {
    /// Unpack `archive` into `output`, descending into nested archives up to
    /// the depth limit.
    fn extract(&self, archive: &Path, output: &Path) -> Result<ExtractionReport>;

    /// How many levels of nested archives to unpack. `0` unpacks the outer
    /// archive only.
    fn set_depth_limit(&mut self, limit: i64) -> Result<()>;

    fn depth_limit(&self) -> Option<u32>;

    /// Where transient work product of nested extraction goes.
    fn set_staging_dir(&mut self, dir: PathBuf) -> Result<()>;

    fn staging_dir(&self) -> Option<&Path>;

    /// Pack the files under `input` into a new archive at `output`, creating
    /// missing parent directories. Empty directories are omitted.
    fn pack(&self, input: &Path, output: &Path) -> Result<PackReport>;
}

/// What one `extract` call produced. Paths are relative to the output folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Regular files written to the output tree.
    pub files_written: usize,

    /// Total uncompressed bytes read across every level.
    pub uncompressed_bytes: u64,

    /// Nested archives that were unpacked (each into a directory named after
    /// the archive without its extension).
    pub nested_extracted: Vec<PathBuf>,

    /// Nested archives left packed because they sit at the depth limit.
    pub nested_kept: Vec<PathBuf>,

    /// Nested entries named like archives that could not be opened as one.
    /// They are copied verbatim.
    pub failed_nested: Vec<PathBuf>,
}

/// What one `pack` call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackReport {
    pub files_packed: usize,

    /// Directories left out because no file lives beneath them.
    pub empty_dirs_omitted: Vec<PathBuf>,
}

/// Check a requested depth limit.
pub(crate) fn validate_depth_limit(limit: i64) -> Result<u32> {
    u32::try_from(limit)
        .map_err(|_| Error::Configuration(format!("depth limit must be >= 0, got {limit}")))
}

/// Check a requested staging directory.
pub(crate) fn validate_staging_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(Error::Configuration(
            "staging directory must not be empty".to_string(),
        ));
    }
    Ok(())
}
