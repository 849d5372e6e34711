//! Directory walking shared by the index scan and the archive streamer.
//!
//! Both consumers need the same skip semantics, so they live here once:
//!
//! - entries whose base name starts with `.` are skipped, and hidden
//!   directories are never descended into
//! - symbolic links are skipped, so a walk never leaves the tree it started in
//! - the root itself is not reported
//!
//! Traversal is depth-first pre-order in the order the filesystem returns
//! entries. Callers must not assume any sorting.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs::{self, ReadDir};
use tracing::trace;

use crate::error::EntryKind;

/// A single entry reported to a [`Visitor`]
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the walk root, always `/`-separated
    pub relative: String,
    /// Base name of the entry
    pub name: String,
    pub kind: EntryKind,
    /// 1 for immediate children of the root
    pub depth: usize,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl WalkEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Callback interface driven by [`Walker::walk`].
///
/// Returning an error from any callback aborts the walk and the error is
/// handed back to the caller unchanged.
#[async_trait]
pub trait Visitor: Send {
    /// Called for every file and directory, directories before their children
    async fn visit(&mut self, entry: &WalkEntry) -> io::Result<()>;

    /// Called once all children of a directory have been visited
    async fn leave_dir(&mut self, _entry: &WalkEntry) -> io::Result<()> {
        Ok(())
    }
}

/// Returns true for names carrying the hidden-file marker
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub struct Walker {
    root: PathBuf,
    max_depth: Option<usize>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: None,
        }
    }

    /// Limit how deep the walk goes; `1` reports only immediate children
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn walk<V: Visitor + ?Sized>(&self, visitor: &mut V) -> io::Result<()> {
        // Each frame is an open directory plus the entry it was reached through
        // (`None` for the root).
        let mut stack: Vec<(ReadDir, Option<WalkEntry>)> =
            vec![(fs::read_dir(&self.root).await?, None)];

        loop {
            let next = match stack.last_mut() {
                Some((dir, _)) => dir.next_entry().await?,
                None => break,
            };

            let Some(dir_entry) = next else {
                if let Some((_, Some(finished))) = stack.pop() {
                    visitor.leave_dir(&finished).await?;
                }
                continue;
            };

            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                trace!(path = %dir_entry.path().display(), "skipping hidden entry");
                continue;
            }

            let file_type = dir_entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                trace!(path = %dir_entry.path().display(), "skipping special entry");
                continue;
            };

            let metadata = dir_entry.metadata().await?;
            let depth = stack.len();
            let relative = match stack.last().and_then(|(_, parent)| parent.as_ref()) {
                Some(parent) => format!("{}/{}", parent.relative, name),
                None => name.clone(),
            };

            let entry = WalkEntry {
                path: dir_entry.path(),
                relative,
                name,
                kind,
                depth,
                len: if kind == EntryKind::File { metadata.len() } else { 0 },
                modified: metadata.modified().ok(),
            };

            visitor.visit(&entry).await?;

            if entry.is_dir() && self.max_depth.is_none_or(|max| depth < max) {
                let children = fs::read_dir(&entry.path).await?;
                stack.push((children, Some(entry)));
            }
        }

        Ok(())
    }
}
