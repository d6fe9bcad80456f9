//! ZIP implementation of [`ArchiveHandler`].

use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use ::zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};
use ignore::WalkBuilder;
use uuid::Uuid;

use super::{ArchiveHandler, ExtractionReport, PackReport, validate_depth_limit, validate_staging_dir};
use crate::{
    config::ArchiveSettings,
    error::{Error, Result},
};

/// Ceiling on uncompressed bytes per `extract` call, across all nesting levels.
pub const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 512 * 1024 * 1024;

type Archive = ZipArchive<BufReader<File>>;

#[derive(Debug, Clone)]
pub struct ZipHandler {
    depth_limit: Option<u32>,
    staging_dir: Option<PathBuf>,
    max_uncompressed_bytes: u64,
}

impl Default for ZipHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipHandler {
    /// An unconfigured handler. Set the depth limit and staging directory
    /// before extracting.
    pub fn new() -> Self {
        Self {
            depth_limit: None,
            staging_dir: None,
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
        }
    }

    /// A fully configured handler.
    pub fn from_settings(settings: &ArchiveSettings) -> Result<Self> {
        let mut handler = Self::new().with_max_uncompressed_bytes(settings.max_uncompressed_bytes);
        handler.set_depth_limit(settings.depth_limit)?;
        handler.set_staging_dir(settings.staging_dir.clone())?;
        Ok(handler)
    }

    #[must_use]
    pub fn with_max_uncompressed_bytes(mut self, max: u64) -> Self {
        self.max_uncompressed_bytes = max;
        self
    }
}

impl ArchiveHandler for ZipHandler {
    fn extract(&self, archive: &Path, output: &Path) -> Result<ExtractionReport> {
        let depth_limit = self
            .depth_limit
            .ok_or_else(|| Error::Configuration("depth limit was never set".to_string()))?;
        let staging_dir = self
            .staging_dir
            .as_deref()
            .ok_or_else(|| Error::Configuration("staging directory was never set".to_string()))?;

        let metadata = fs::metadata(archive)
            .map_err(|e| Error::not_found(archive, format!("archive does not exist: {e}")))?;
        if !metadata.is_file() {
            return Err(Error::not_found(archive, "archive is not a file"));
        }
        if metadata.len() == 0 {
            return Err(Error::not_found(archive, "archive is empty"));
        }
        if output.exists() && !output.is_dir() {
            return Err(Error::Configuration(format!(
                "output folder {} is not a directory",
                output.display()
            )));
        }

        let mut zip = open_archive(archive)
            .map_err(|e| Error::Format(format!("{} is not a valid zip archive: {e}", archive.display())))?;

        tracing::info!(
            archive = %archive.display(),
            output = %output.display(),
            depth_limit,
            "extracting submission archive"
        );

        fs::create_dir_all(output)?;
        let mut extraction = Extraction {
            depth_limit,
            staging_dir,
            max_uncompressed_bytes: self.max_uncompressed_bytes,
            report: ExtractionReport::default(),
        };
        extraction.unpack(&mut zip, output, Path::new(""), 0)?;

        let report = extraction.report;
        tracing::info!(
            archive = %archive.display(),
            files = report.files_written,
            nested = report.nested_extracted.len(),
            kept = report.nested_kept.len(),
            failed = report.failed_nested.len(),
            "extraction finished"
        );
        Ok(report)
    }

    fn set_depth_limit(&mut self, limit: i64) -> Result<()> {
        self.depth_limit = Some(validate_depth_limit(limit)?);
        Ok(())
    }

    fn depth_limit(&self) -> Option<u32> {
        self.depth_limit
    }

    fn set_staging_dir(&mut self, dir: PathBuf) -> Result<()> {
        validate_staging_dir(&dir)?;
        self.staging_dir = Some(dir);
        Ok(())
    }

    fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    fn pack(&self, input: &Path, output: &Path) -> Result<PackReport> {
        if !input.is_dir() {
            return Err(Error::not_found(input, "input folder does not exist"));
        }
        if output.is_dir() {
            return Err(Error::Configuration(format!(
                "archive location {} is a directory",
                output.display()
            )));
        }

        let listing = Listing::collect(input, output)?;
        if listing.files.is_empty() {
            return Err(Error::not_found(input, "input folder contains no files"));
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Configuration(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let file = File::create(output).map_err(|e| {
            Error::Configuration(format!("cannot create archive {}: {e}", output.display()))
        })?;

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(file);
        for rel in &listing.files {
            writer
                .start_file(entry_name(rel), options)
                .map_err(|e| zip_error(output, e))?;
            let mut source = File::open(input.join(rel))?;
            io::copy(&mut source, &mut writer)?;
        }
        writer.finish().map_err(|e| zip_error(output, e))?;

        let empty_dirs_omitted = listing.empty_dirs();
        tracing::info!(
            input = %input.display(),
            archive = %output.display(),
            files = listing.files.len(),
            empty_dirs = empty_dirs_omitted.len(),
            "packed archive"
        );
        Ok(PackReport {
            files_packed: listing.files.len(),
            empty_dirs_omitted,
        })
    }
}

/// State for one `extract` call.
struct Extraction<'a> {
    depth_limit: u32,
    staging_dir: &'a Path,
    max_uncompressed_bytes: u64,
    report: ExtractionReport,
}

impl Extraction<'_> {
    /// Unpack every entry of `zip` into `output`.
    ///
    /// `prefix` is `output` relative to the top-level output folder and
    /// `level` is the nesting level of `zip` itself (the outer archive is 0).
    fn unpack(&mut self, zip: &mut Archive, output: &Path, prefix: &Path, level: u32) -> Result<()> {
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| zip_error(output, e))?;
            let Some(rel) = entry.enclosed_name() else {
                return Err(Error::Format(format!(
                    "entry `{}` escapes the output folder",
                    entry.name()
                )));
            };
            let target = output.join(&rel);

            if entry.is_dir() {
                if target.exists() && !target.is_dir() {
                    return Err(collision(&prefix.join(&rel)));
                }
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if target.is_dir() {
                return Err(collision(&prefix.join(&rel)));
            }

            if !is_zip_name(&rel) {
                self.copy_entry(&mut entry, &target)?;
                self.report.files_written += 1;
                continue;
            }

            let nested = prefix.join(&rel);
            if level < self.depth_limit {
                self.unpack_nested(&mut entry, &target, &nested, level + 1)?;
            } else {
                tracing::debug!(archive = %nested.display(), "depth limit reached; leaving archive packed");
                self.copy_entry(&mut entry, &target)?;
                self.report.files_written += 1;
                self.report.nested_kept.push(nested);
            }
        }
        Ok(())
    }

    /// Stage a nested archive, then unpack it next to where it was found.
    ///
    /// A nested archive that cannot be opened, or whose entries do not read
    /// back intact, is copied verbatim and reported in `failed_nested`.
    fn unpack_nested(
        &mut self,
        entry: &mut impl Read,
        target: &Path,
        nested: &Path,
        level: u32,
    ) -> Result<()> {
        let staging = StagingDir::create(self.staging_dir)?;
        let staged = staging.path().join("nested.zip");
        self.copy_entry(entry, &staged)?;

        let budget = self
            .max_uncompressed_bytes
            .saturating_sub(self.report.uncompressed_bytes);
        let checked = open_archive(&staged).and_then(|mut zip| {
            check_entries(&mut zip, budget)?;
            Ok(zip)
        });
        let mut zip = match checked {
            Ok(zip) => zip,
            Err(e) => {
                tracing::warn!(
                    archive = %nested.display(),
                    error = %e,
                    "nested entry is not a valid archive; copying it verbatim"
                );
                fs::copy(&staged, target)?;
                self.report.files_written += 1;
                self.report.failed_nested.push(nested.to_path_buf());
                return Ok(());
            }
        };

        let into = target.with_extension("");
        if into.exists() && !into.is_dir() {
            return Err(collision(&nested.with_extension("")));
        }
        fs::create_dir_all(&into)?;
        tracing::debug!(archive = %nested.display(), level, "unpacking nested archive");
        self.unpack(&mut zip, &into, &nested.with_extension(""), level)?;
        self.report.nested_extracted.push(nested.to_path_buf());
        Ok(())
    }

    /// Copy one entry's bytes to `target`, charging them against the size cap.
    fn copy_entry(&mut self, entry: &mut impl Read, target: &Path) -> Result<()> {
        let remaining = self
            .max_uncompressed_bytes
            .saturating_sub(self.report.uncompressed_bytes);
        let mut out = File::create(target)?;
        let written = io::copy(&mut entry.take(remaining.saturating_add(1)), &mut out)?;

        self.report.uncompressed_bytes += written;
        if self.report.uncompressed_bytes > self.max_uncompressed_bytes {
            return Err(Error::Format(format!(
                "uncompressed size exceeds the limit of {} bytes",
                self.max_uncompressed_bytes
            )));
        }
        Ok(())
    }
}

/// A private `staging/<uuid>` directory, removed when dropped.
struct StagingDir(PathBuf);

impl StagingDir {
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.0) {
            tracing::warn!(path = %self.0.display(), error = %e, "failed to remove staging directory");
        }
    }
}

/// Files and directories under a pack input, relative and in name order.
struct Listing {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl Listing {
    fn collect(input: &Path, skip: &Path) -> Result<Self> {
        let walker = WalkBuilder::new(input)
            .standard_filters(false)
            .sort_by_file_name(Ord::cmp)
            .build();

        let mut listing = Self {
            files: Vec::new(),
            dirs: Vec::new(),
        };
        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if entry.depth() == 0 || entry.path() == skip {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(input) else {
                continue;
            };
            match entry.file_type() {
                Some(ft) if ft.is_dir() => listing.dirs.push(rel.to_path_buf()),
                Some(ft) if ft.is_file() => listing.files.push(rel.to_path_buf()),
                _ => {}
            }
        }
        Ok(listing)
    }

    fn empty_dirs(&self) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .filter(|dir| !self.files.iter().any(|file| file.starts_with(dir)))
            .cloned()
            .collect()
    }
}

fn open_archive(path: &Path) -> core::result::Result<Archive, ZipError> {
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file))
}

/// Read every entry of `zip` to the end so corrupt data (a bad local
/// header, a checksum mismatch) shows up before anything is written.
///
/// Reading stops once `budget` bytes have been seen; the size cap is
/// reported by the extraction itself.
fn check_entries(zip: &mut Archive, budget: u64) -> core::result::Result<(), ZipError> {
    let mut seen: u64 = 0;
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let left = budget.saturating_sub(seen).saturating_add(1);
        seen += io::copy(&mut entry.take(left), &mut io::sink())?;
        if seen > budget {
            break;
        }
    }
    Ok(())
}

fn is_zip_name(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Archive entry names always use `/`, whatever the host separator.
fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn collision(rel: &Path) -> Error {
    Error::Format(format!(
        "entry `{}` collides with another entry of a different kind",
        rel.display()
    ))
}

fn zip_error(path: &Path, e: ZipError) -> Error {
    match e {
        ZipError::Io(e) => Error::Io(e),
        other => Error::Format(format!("{}: {other}", path.display())),
    }
}
