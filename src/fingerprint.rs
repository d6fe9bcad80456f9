//! Content identity: a deterministic digest over a directory tree.
//!
//! The digest algorithm is SHA-256, rendered as lowercase hex. It is part of
//! the deduplication contract used by upstream caches, so changing it
//! invalidates every fingerprint computed before.
//!
//! Every entry contributes one hex digest string,
//! `sha256(kind ‖ name ‖ 0x00 ‖ content)`, where `kind` is `f`, `d` or `l`:
//!
//! - a file's content is the hex digest of its bytes;
//! - a directory's content is its children's entry strings concatenated in
//!   byte-wise name order;
//! - a symbolic link's content is its target path. Links are never followed,
//!   so nothing outside the tree is read.
//!
//! The root contributes its content only: the fingerprint is the digest of
//! the root's concatenated entry strings. Renaming an entry, or swapping a
//! file for a directory, changes it.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    fs::{self, File, FileType},
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Fixed-length hex digest identifying the full recursive contents of a tree.
///
/// Values are never updated in place: a changed tree gets a new fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
    Link,
}

impl Kind {
    fn of(path: &Path, file_type: FileType) -> Result<Self> {
        if file_type.is_symlink() {
            Ok(Self::Link)
        } else if file_type.is_dir() {
            Ok(Self::Dir)
        } else if file_type.is_file() {
            Ok(Self::File)
        } else {
            Err(Error::Format(format!(
                "{} is neither a file, a directory nor a symbolic link",
                path.display()
            )))
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::File => b'f',
            Self::Dir => b'd',
            Self::Link => b'l',
        }
    }
}

/// Hex digest of one entry: its kind, its name, and what it holds.
fn entry_digest(kind: Kind, name: &OsStr, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update([kind.tag()]);
    hasher.update(name.as_encoded_bytes());
    hasher.update([0]);
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// One directory whose children are still being digested.
struct Frame {
    name: OsString,
    children: Vec<(OsString, PathBuf, Kind)>,
    next: usize,
    digests: String,
}

impl Frame {
    fn open(name: OsString, dir: &Path) -> Result<Self> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let kind = Kind::of(&path, entry.file_type()?)?;
            children.push((entry.file_name(), path, kind));
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            name,
            children,
            next: 0,
            digests: String::new(),
        })
    }
}

/// Compute the fingerprint of the tree rooted at `tree`.
///
/// Traversal is post-order over an explicit stack, so deep trees do not
/// grow the call stack. Any unreadable entry aborts the whole computation;
/// no partial fingerprint is ever returned.
pub fn fingerprint(tree: &Path) -> Result<ContentFingerprint> {
    if !tree.is_dir() {
        return Err(Error::not_found(tree, "submission tree is not a directory"));
    }

    let mut stack = vec![Frame::open(OsString::new(), tree)?];
    let mut digest = String::new();

    while let Some(top) = stack.last_mut() {
        if let Some((name, path, kind)) = top.children.get(top.next).cloned() {
            top.next += 1;
            match kind {
                Kind::Dir => stack.push(Frame::open(name, &path)?),
                Kind::File => {
                    let content = file_digest(&path)?;
                    top.digests
                        .push_str(&entry_digest(kind, &name, content.as_bytes()));
                }
                Kind::Link => {
                    let target = fs::read_link(&path)?;
                    top.digests.push_str(&entry_digest(
                        kind,
                        &name,
                        target.as_os_str().as_encoded_bytes(),
                    ));
                }
            }
            continue;
        }

        let Some(done) = stack.pop() else { break };
        match stack.last_mut() {
            Some(parent) => parent.digests.push_str(&entry_digest(
                Kind::Dir,
                &done.name,
                done.digests.as_bytes(),
            )),
            None => digest = hex::encode(Sha256::digest(done.digests.as_bytes())),
        }
    }

    tracing::debug!(tree = %tree.display(), %digest, "fingerprint computed");
    Ok(ContentFingerprint(digest))
}

/// Hex SHA-256 of one file's bytes, streamed.
fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "cannot read file for fingerprint");
    })?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Main.java", b"class Main {}");
        write(dir.path(), "util/Helper.java", b"class Helper {}");
        write(dir.path(), "util/deep/Deeper.java", b"class Deeper {}");
        write(dir.path(), "README", b"readme");
        dir
    }

    #[test]
    fn digest_is_hex_sha256() {
        let dir = sample_tree();
        let fp = fingerprint(dir.path()).unwrap();

        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn identical_trees_match_regardless_of_creation_order() {
        let a = sample_tree();

        let b = TempDir::new().unwrap();
        write(b.path(), "util/deep/Deeper.java", b"class Deeper {}");
        write(b.path(), "README", b"readme");
        write(b.path(), "util/Helper.java", b"class Helper {}");
        write(b.path(), "Main.java", b"class Main {}");

        assert_eq!(fingerprint(a.path()).unwrap(), fingerprint(b.path()).unwrap());
    }

    #[test]
    fn repeated_runs_are_stable() {
        let dir = sample_tree();
        assert_eq!(
            fingerprint(dir.path()).unwrap(),
            fingerprint(dir.path()).unwrap()
        );
    }

    #[test]
    fn single_byte_change_changes_fingerprint() {
        let dir = sample_tree();
        let before = fingerprint(dir.path()).unwrap();

        write(dir.path(), "util/deep/Deeper.java", b"class Deeper {]");
        let after = fingerprint(dir.path()).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn adding_a_file_changes_fingerprint() {
        let dir = sample_tree();
        let before = fingerprint(dir.path()).unwrap();

        write(dir.path(), "util/Extra.java", b"");
        assert_ne!(before, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn removing_a_file_changes_fingerprint() {
        let dir = sample_tree();
        let before = fingerprint(dir.path()).unwrap();

        fs::remove_file(dir.path().join("README")).unwrap();
        assert_ne!(before, fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn entries_hash_kind_name_and_content_in_name_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.txt", b"second");
        write(dir.path(), "a.txt", b"first");

        let entry = |name: &str, contents: &[u8]| {
            let content = hex::encode(Sha256::digest(contents));
            hex::encode(Sha256::digest(format!("f{name}\0{content}").as_bytes()))
        };
        let a = entry("a.txt", b"first");
        let b = entry("b.txt", b"second");
        let expected = hex::encode(Sha256::digest(format!("{a}{b}").as_bytes()));

        assert_eq!(fingerprint(dir.path()).unwrap().as_str(), expected);
    }

    #[test]
    fn empty_tree_is_digest_of_nothing() {
        let dir = TempDir::new().unwrap();
        let expected = hex::encode(Sha256::digest(b""));
        assert_eq!(fingerprint(dir.path()).unwrap().as_str(), expected);
    }

    #[test]
    fn renaming_a_file_changes_fingerprint() {
        let a = TempDir::new().unwrap();
        write(a.path(), "a/Main.java", b"class X {}");
        let b = TempDir::new().unwrap();
        write(b.path(), "b/Other.java", b"class X {}");

        assert_ne!(fingerprint(a.path()).unwrap(), fingerprint(b.path()).unwrap());
    }

    #[test]
    fn empty_file_differs_from_empty_directory() {
        let file = TempDir::new().unwrap();
        write(file.path(), "x", b"");
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("x")).unwrap();

        assert_ne!(fingerprint(file.path()).unwrap(), fingerprint(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_hash_their_target_without_following_it() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        write(outside.path(), "secret.txt", b"outside the tree");

        let dir = sample_tree();
        symlink(outside.path(), dir.path().join("escape")).unwrap();
        let linked = fingerprint(dir.path()).unwrap();

        // The target's contents are never read.
        write(outside.path(), "secret.txt", b"changed");
        assert_eq!(fingerprint(dir.path()).unwrap(), linked);

        fs::remove_file(dir.path().join("escape")).unwrap();
        symlink(dir.path().join("README"), dir.path().join("escape")).unwrap();
        assert_ne!(fingerprint(dir.path()).unwrap(), linked);
    }

    #[test]
    fn missing_tree_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = fingerprint(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_aborts_with_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = sample_tree();
        let locked = dir.path().join("util/Helper.java");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to assert in that case.
        if File::open(&locked).is_ok() {
            return;
        }

        let err = fingerprint(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn deep_trees_do_not_recurse() {
        let dir = TempDir::new().unwrap();
        let mut rel = PathBuf::new();
        for i in 0..200 {
            rel.push(format!("d{i}"));
        }
        write(dir.path(), &rel.join("leaf.txt").to_string_lossy(), b"leaf");

        assert!(fingerprint(dir.path()).is_ok());
    }
}
