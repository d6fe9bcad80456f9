//! Qualified names for dynamically loaded artifacts.

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Component, Path, PathBuf},
};

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// A dot-separated artifact name such as `edu.course.MainTest`.
///
/// Segments are never empty and never `.` or `..`, so a name always maps to
/// a path inside whichever root it is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName(Vec<String>);

impl QualifiedName {
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_segments(name.split('.').map(str::to_string), name)
    }

    fn from_segments(segments: impl IntoIterator<Item = String>, raw: &str) -> Result<Self> {
        let segments: Vec<String> = segments.into_iter().collect();
        let valid = !segments.is_empty()
            && segments
                .iter()
                .all(|s| !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\']));
        if !valid {
            return Err(Error::load_failure(raw, "not a valid qualified name"));
        }
        Ok(Self(segments))
    }

    /// Name of an artifact from its location under `root`: separators become
    /// dots and the extension is dropped.
    pub fn from_relative_path(root: &Path, path: &Path) -> Result<Self> {
        let rel = path
            .strip_prefix(root)
            .map_err(|_| Error::load_failure(path.display(), "artifact lies outside its root"))?;

        let mut segments = Vec::new();
        for component in rel.with_extension("").components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                _ => return Err(Error::load_failure(path.display(), "unexpected path component")),
            }
        }
        Self::from_segments(segments, &rel.display().to_string())
    }

    /// Name of a test from its source file: the namespace declared in the
    /// header (the first line matching `namespace`, capture group 1), then
    /// the file's base name. Without a declaration the base name stands
    /// alone.
    pub fn from_source(path: &Path, namespace: &Regex) -> Result<Self> {
        let base = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::load_failure(path.display(), "test source has no file name"))?;

        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if let Some(declared) = namespace.captures(&line).and_then(|c| c.get(1)) {
                let qualified = format!("{}.{base}", declared.as_str());
                return Self::parse(&qualified);
            }
        }

        Self::parse(&base)
    }

    /// Where an artifact with this name lives relative to a search root.
    pub fn to_relative_path(&self, suffix: &str) -> PathBuf {
        let mut path: PathBuf = self.0.iter().collect();
        path.set_extension(suffix);
        path
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    fn package_regex() -> Regex {
        Regex::new(r"^\s*package\s+([^,;\s]+)\s*;").unwrap()
    }

    #[test]
    fn parses_dotted_names() {
        let name = QualifiedName::parse("edu.course.MainTest").unwrap();
        assert_eq!(name.segments(), ["edu", "course", "MainTest"]);
        assert_eq!(name.to_string(), "edu.course.MainTest");
    }

    #[test]
    fn rejects_malformed_names() {
        for raw in ["", "a..b", ".a", "a.", "a/b"] {
            assert!(
                matches!(QualifiedName::parse(raw), Err(Error::LoadFailure { .. })),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn derives_name_from_relative_path() {
        let root = Path::new("/work/bin");
        let name =
            QualifiedName::from_relative_path(root, Path::new("/work/bin/edu/course/Main.class"))
                .unwrap();
        assert_eq!(name.to_string(), "edu.course.Main");
    }

    #[test]
    fn path_outside_root_is_rejected() {
        let err = QualifiedName::from_relative_path(Path::new("/a"), Path::new("/b/C.class"))
            .unwrap_err();
        assert!(matches!(err, Error::LoadFailure { .. }));
    }

    #[test]
    fn maps_back_to_a_relative_path() {
        let name = QualifiedName::parse("edu.course.Main").unwrap();
        assert_eq!(
            name.to_relative_path("class"),
            PathBuf::from("edu/course/Main.class")
        );
    }

    #[test]
    fn source_header_supplies_namespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MainTest.java");
        fs::write(
            &path,
            "// header comment\npackage edu.course;\n\nimport org.junit.Test;\n",
        )
        .unwrap();

        let name = QualifiedName::from_source(&path, &package_regex()).unwrap();
        assert_eq!(name.to_string(), "edu.course.MainTest");
    }

    #[test]
    fn source_without_namespace_uses_base_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MainTest.java");
        fs::write(&path, "import org.junit.Test;\npublic class MainTest {}\n").unwrap();

        let name = QualifiedName::from_source(&path, &package_regex()).unwrap();
        assert_eq!(name.to_string(), "MainTest");
    }

    #[test]
    fn only_the_first_declaration_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("T.java");
        fs::write(&path, "package first;\npackage second;\n").unwrap();

        let name = QualifiedName::from_source(&path, &package_regex()).unwrap();
        assert_eq!(name.to_string(), "first.T");
    }

    #[test]
    fn unreadable_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err =
            QualifiedName::from_source(&dir.path().join("Absent.java"), &package_regex())
                .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn serializes_as_dotted_string() {
        let name = QualifiedName::parse("a.B").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"a.B\"");
    }
}
