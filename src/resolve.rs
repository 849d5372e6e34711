//! Traversal-safe resolution of user supplied identifiers.
//!
//! The containment check runs on canonical paths, after `.`/`..` and
//! symlinks have been resolved. A prefix test on the joined, unresolved path
//! would let a symlink inside the root point anywhere on the host.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{EntryKind, Result, ShelfError};

pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `id` below the root and check it is an entry of `kind`.
    ///
    /// # Errors
    ///
    /// - [`ShelfError::InvalidPath`] for empty or absolute ids, ids with a
    ///   `..` segment, and ids whose canonical target escapes the root
    /// - [`ShelfError::NotFound`] when the target does not exist
    /// - [`ShelfError::InvalidKind`] when the target is not a `kind`
    /// - [`ShelfError::ScanFailure`] when the root itself cannot be resolved
    pub async fn resolve(&self, id: &str, kind: EntryKind) -> Result<PathBuf> {
        check_identifier(id)?;

        let root = fs::canonicalize(&self.root)
            .await
            .map_err(|e| ShelfError::scan(&self.root, e))?;

        let target = match fs::canonicalize(root.join(id)).await {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ShelfError::not_found("path", id));
            }
            Err(e) => {
                warn!(id, error = %e, "failed to canonicalize");
                return Err(ShelfError::not_found("path", id));
            }
        };

        // Component-wise, so `/srv/shelf-other` is not inside `/srv/shelf`.
        if !target.starts_with(&root) || target == root {
            warn!(id, target = %target.display(), "resolved path escapes root");
            return Err(ShelfError::InvalidPath(id.to_string()));
        }

        let metadata = fs::metadata(&target)
            .await
            .map_err(|_| ShelfError::not_found("path", id))?;
        let actual = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        if actual != kind {
            return Err(ShelfError::InvalidKind {
                name: id.to_string(),
                expected: kind,
            });
        }

        debug!(id, path = %target.display(), "resolved");
        Ok(target)
    }
}

/// Reject identifiers that could leave the root before touching the disk.
pub fn check_identifier(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('\0') {
        return Err(ShelfError::InvalidPath(id.to_string()));
    }

    // Backslashes count as separators too, whatever the host convention.
    if id.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ShelfError::InvalidPath(id.to_string()));
    }

    let escapes = Path::new(id).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(ShelfError::InvalidPath(id.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        stdfs::create_dir_all(temp.path().join("Fluro/assets")).unwrap();
        stdfs::write(temp.path().join("Fluro/main.json"), "{}").unwrap();
        stdfs::write(temp.path().join("hello.lua"), "name = \"Hello\"").unwrap();
        temp
    }

    #[tokio::test]
    async fn resolves_directory_and_file() {
        let temp = fixture();
        let resolver = PathResolver::new(temp.path());
        let root = stdfs::canonicalize(temp.path()).unwrap();

        let dir = resolver.resolve("Fluro", EntryKind::Directory).await.unwrap();
        assert_eq!(dir, root.join("Fluro"));

        let file = resolver.resolve("Fluro/main.json", EntryKind::File).await.unwrap();
        assert_eq!(file, root.join("Fluro/main.json"));
    }

    #[tokio::test]
    async fn rejects_traversal_before_filesystem_access() {
        // The root does not exist, so any filesystem access would fail with
        // ScanFailure instead.
        let resolver = PathResolver::new("/nonexistent/shelf/root");
        for id in ["../secret", "a/../../b", "..\\secret", "/etc/passwd", "", ".."] {
            let err = resolver.resolve(id, EntryKind::File).await.unwrap_err();
            assert!(matches!(err, ShelfError::InvalidPath(_)), "{id}: {err}");
        }
    }

    #[tokio::test]
    async fn current_dir_is_not_an_item() {
        let temp = fixture();
        let resolver = PathResolver::new(temp.path());
        let err = resolver.resolve(".", EntryKind::Directory).await.unwrap_err();
        assert!(matches!(err, ShelfError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn missing_and_mismatched_entries() {
        let temp = fixture();
        let resolver = PathResolver::new(temp.path());

        let err = resolver.resolve("Missing", EntryKind::Directory).await.unwrap_err();
        assert!(matches!(err, ShelfError::NotFound { .. }));

        let err = resolver.resolve("Fluro", EntryKind::File).await.unwrap_err();
        assert!(matches!(
            err,
            ShelfError::InvalidKind {
                expected: EntryKind::File,
                ..
            }
        ));

        let err = resolver.resolve("hello.lua", EntryKind::Directory).await.unwrap_err();
        assert!(matches!(err, ShelfError::InvalidKind { .. }));
    }

    #[tokio::test]
    async fn unreadable_root_is_scan_failure() {
        let temp = TempDir::new().unwrap();
        let resolver = PathResolver::new(temp.path().join("gone"));
        let err = resolver.resolve("Fluro", EntryKind::Directory).await.unwrap_err();
        assert!(matches!(err, ShelfError::ScanFailure { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_rejected_after_canonicalization() {
        let temp = fixture();
        let outside = TempDir::new().unwrap();
        stdfs::write(outside.path().join("secret.txt"), "nope").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("linked")).unwrap();

        let resolver = PathResolver::new(temp.path());
        let err = resolver.resolve("linked/secret.txt", EntryKind::File).await.unwrap_err();
        assert!(matches!(err, ShelfError::InvalidPath(_)));
    }
}
