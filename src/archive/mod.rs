//! On-demand archives of an item directory.
//!
//! The streamer walks the item with the shared [`Walker`](crate::walk::Walker),
//! so hidden entries and symlinks are excluded exactly as in listings, and
//! feeds each file into an [`ArchiveEncoder`]. Encoders write straight into
//! the destination; at most one read chunk and its compressed output are held
//! in memory.
//!
//! Once streaming has started the response head is already out, so a failure
//! can only be reported by cutting the body short. The caller sees a single
//! [`ShelfError::ArchiveFailure`].

mod tar;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod zip;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

pub use self::tar::{TAR_BLOCK_LEN, TarEntryType, TarGzStreamWriter, TarHeader};
pub use self::zip::ZipStreamWriter;
use crate::api::content_disposition;
use crate::error::{Result, ShelfError};
use crate::walk::{Visitor, WalkEntry, Walker};

/// Read size for file data fed into an encoder
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ArchiveFormat {
    Zip,
    #[value(name = "tar-gz")]
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "application/zip",
            ArchiveFormat::TarGz => "application/gzip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar.gz" | "tar-gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            _ => Err(format!("unknown archive format: {s}")),
        }
    }
}

/// Size and timestamp of an entry handed to an encoder
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl From<&WalkEntry> for EntryMeta {
    fn from(entry: &WalkEntry) -> Self {
        Self {
            len: entry.len,
            modified: entry.modified,
        }
    }
}

/// A streaming archive container. Implementations write to their
/// destination as entries arrive and never seek.
#[async_trait]
pub trait ArchiveEncoder: Send {
    /// Append a regular file whose data is read from `source`. Returns the
    /// number of bytes taken from `source`.
    async fn add_file(
        &mut self,
        name: &str,
        meta: &EntryMeta,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> io::Result<u64>;

    /// Append an explicit directory entry
    async fn add_directory(&mut self, name: &str, meta: &EntryMeta) -> io::Result<()>;

    /// Write trailing records and flush the destination
    async fn finish(&mut self) -> io::Result<()>;
}

/// Summary of a finished archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub directories: u64,
    pub bytes_in: u64,
}

/// One download: what to archive, in which format, under which name.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub source_root: PathBuf,
    pub format: ArchiveFormat,
    /// Item id, used as the archive's base name
    pub id: String,
}

impl ArchiveJob {
    pub fn new(
        source_root: impl Into<PathBuf>,
        id: impl Into<String>,
        format: ArchiveFormat,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            format,
            id: id.into(),
        }
    }

    /// `<id>.zip` or `<id>.tar.gz`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.format.extension())
    }

    pub fn content_disposition(&self) -> String {
        content_disposition(&self.file_name())
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub async fn stream_to<W>(&self, dest: W) -> Result<ArchiveStats>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let stats = stream_archive(&self.source_root, dest, self.format).await?;
        info!(
            id = %self.id,
            format = %self.format,
            files = stats.files,
            directories = stats.directories,
            bytes = stats.bytes_in,
            "archive streamed"
        );
        Ok(stats)
    }
}

/// Archive `source` into `dest`.
///
/// A directory is walked recursively with paths relative to it; a single
/// file becomes a one-entry archive named after the file.
///
/// # Errors
///
/// Any read, walk or write failure aborts the archive and is returned as
/// [`ShelfError::ArchiveFailure`]; bytes already written stay written.
pub async fn stream_archive<W>(
    source: &Path,
    dest: W,
    format: ArchiveFormat,
) -> Result<ArchiveStats>
where
    W: AsyncWrite + Unpin + Send,
{
    let result = match format {
        ArchiveFormat::Zip => encode(source, ZipStreamWriter::new(dest)).await,
        ArchiveFormat::TarGz => encode(source, TarGzStreamWriter::new(dest)).await,
    };

    result.map_err(|e| {
        warn!(source = %source.display(), %format, error = %e, "archive aborted");
        ShelfError::ArchiveFailure(e)
    })
}

async fn encode<E: ArchiveEncoder>(source: &Path, mut encoder: E) -> io::Result<ArchiveStats> {
    let metadata = fs::metadata(source).await?;
    let mut visitor = ArchiveVisitor {
        encoder: &mut encoder,
        stats: ArchiveStats::default(),
        open_dirs: Vec::new(),
    };

    if metadata.is_dir() {
        Walker::new(source).walk(&mut visitor).await?;
    } else {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;
        let meta = EntryMeta {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        };
        visitor.add_file(source, &name, &meta).await?;
    }

    let stats = visitor.stats;
    encoder.finish().await?;
    Ok(stats)
}

struct ArchiveVisitor<'a, E: ?Sized> {
    encoder: &'a mut E,
    stats: ArchiveStats,
    /// Entry count at the time each open directory was entered
    open_dirs: Vec<u64>,
}

impl<E: ArchiveEncoder + ?Sized> ArchiveVisitor<'_, E> {
    fn written(&self) -> u64 {
        self.stats.files + self.stats.directories
    }

    async fn add_file(&mut self, path: &Path, name: &str, meta: &EntryMeta) -> io::Result<()> {
        let mut file = File::open(path).await?;
        let read = self.encoder.add_file(name, meta, &mut file).await?;
        self.stats.files += 1;
        self.stats.bytes_in += read;
        if read != meta.len {
            debug!(name, listed = meta.len, read, "file size changed while archiving");
        }
        debug!(name, len = read, "archived file");
        Ok(())
    }
}

#[async_trait]
impl<'a, E: ArchiveEncoder + ?Sized> Visitor for ArchiveVisitor<'a, E> {
    async fn visit(&mut self, entry: &WalkEntry) -> io::Result<()> {
        if entry.is_dir() {
            let mark = self.written();
            self.open_dirs.push(mark);
            return Ok(());
        }
        self.add_file(&entry.path, &entry.relative, &EntryMeta::from(entry))
            .await
    }

    async fn leave_dir(&mut self, entry: &WalkEntry) -> io::Result<()> {
        // Directories with content are implied by their entries' paths;
        // only empty ones need an explicit record.
        if self.open_dirs.pop() == Some(self.written()) {
            self.encoder
                .add_directory(&entry.relative, &EntryMeta::from(entry))
                .await?;
            self.stats.directories += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{read_tar_gz, read_zip};
    use super::*;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn item() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        stdfs::create_dir_all(root.join("sub")).unwrap();
        stdfs::create_dir_all(root.join(".hidden")).unwrap();
        stdfs::create_dir_all(root.join("empty")).unwrap();
        stdfs::write(root.join("a.txt"), "X").unwrap();
        stdfs::write(root.join("sub/b.txt"), "Y").unwrap();
        stdfs::write(root.join(".DS_Store"), "junk").unwrap();
        stdfs::write(root.join(".hidden/secret.txt"), "nope").unwrap();
        temp
    }

    fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
        v.sort();
        v
    }

    #[tokio::test]
    async fn zip_contains_files_and_empty_dirs_only() {
        let temp = item();
        let mut out = Vec::new();
        let stats = stream_archive(temp.path(), &mut out, ArchiveFormat::Zip)
            .await
            .unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 1);
        assert_eq!(stats.bytes_in, 2);

        assert_eq!(
            sorted(read_zip(&out)),
            vec![
                ("a.txt".to_string(), b"X".to_vec()),
                ("empty/".to_string(), Vec::new()),
                ("sub/b.txt".to_string(), b"Y".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn tar_gz_matches_zip_layout() {
        let temp = item();
        let mut out = Vec::new();
        stream_archive(temp.path(), &mut out, ArchiveFormat::TarGz)
            .await
            .unwrap();

        assert_eq!(
            sorted(read_tar_gz(&out)),
            vec![
                ("a.txt".to_string(), b"X".to_vec()),
                ("empty/".to_string(), Vec::new()),
                ("sub/b.txt".to_string(), b"Y".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn single_file_source() {
        let temp = item();
        let mut out = Vec::new();
        stream_archive(&temp.path().join("a.txt"), &mut out, ArchiveFormat::Zip)
            .await
            .unwrap();

        assert_eq!(read_zip(&out), vec![("a.txt".to_string(), b"X".to_vec())]);
    }

    #[tokio::test]
    async fn missing_source_is_archive_failure() {
        let temp = TempDir::new().unwrap();
        let err = stream_archive(&temp.path().join("gone"), Vec::new(), ArchiveFormat::TarGz)
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::ArchiveFailure(_)));
    }

    #[test]
    fn job_naming() {
        let job = ArchiveJob::new("/srv/configs/Fluro", "Fluro \"UI\"", ArchiveFormat::Zip);
        assert_eq!(job.file_name(), "Fluro \"UI\".zip");
        assert_eq!(job.content_disposition(), "attachment; filename=\"Fluro _UI_.zip\"");
        assert_eq!(job.content_type(), "application/zip");

        assert_eq!("tgz".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::TarGz.extension(), "tar.gz");
    }
}
