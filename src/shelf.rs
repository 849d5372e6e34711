//! Request entry point tying the index, resolver and archive streamer together.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::api::{ApiRequest, Operation, ResponseHead, ResponseSink, content_type_for};
use crate::archive::ArchiveJob;
use crate::catalog::{Category, IndexedItem, ItemEncoding, ResourceDescriptor, ResourceIndex};
use crate::config::{CategoryLayout, ShelfConfig};
use crate::error::{EntryKind, Result, ShelfError};
use crate::resolve::{PathResolver, check_identifier};
use crate::walk::is_hidden;

/// An opened item file, ready to be copied into a response body
#[derive(Debug)]
pub struct FileDownload {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: &'static str,
    pub len: u64,
    pub file: File,
}

pub struct Shelf {
    config: ShelfConfig,
    index: ResourceIndex,
}

impl Shelf {
    pub fn new(config: ShelfConfig) -> Self {
        let index = ResourceIndex::new(&config);
        Self { config, index }
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    /// Descriptors of one category, in filesystem order. Refreshes the
    /// category's name map.
    pub async fn list(&self, category: Category) -> Result<Vec<ResourceDescriptor>> {
        self.index.list_category(category).await
    }

    /// Descriptors of every configured category.
    ///
    /// An unreadable category contributes an empty list instead of failing
    /// the whole response.
    pub async fn list_all(&self) -> Result<BTreeMap<Category, Vec<ResourceDescriptor>>> {
        let mut all = BTreeMap::new();
        for layout in &self.config.categories {
            let descriptors = match self.index.list_category(layout.category).await {
                Ok(descriptors) => descriptors,
                Err(e @ ShelfError::ScanFailure { .. }) => {
                    warn!(category = %layout.category, error = %e, "category unavailable");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            all.insert(layout.category, descriptors);
        }
        Ok(all)
    }

    /// Open a file of an item.
    ///
    /// Directory items need `filename`, a path relative to the item. Flat
    /// items serve their source file; `filename`, if given, must name it.
    ///
    /// # Errors
    ///
    /// - [`ShelfError::InvalidPath`] for traversal attempts in `name` or
    ///   `filename`
    /// - [`ShelfError::NotFound`] for unknown items, missing or hidden files
    /// - [`ShelfError::InvalidKind`] when `filename` names a directory
    pub async fn get_file(
        &self,
        category: Category,
        name: &str,
        filename: Option<&str>,
    ) -> Result<FileDownload> {
        check_identifier(name)?;
        if let Some(filename) = filename {
            check_identifier(filename)?;
        }

        let layout = self.layout(category)?;
        let item = self.index.resolve(category, name).await?;
        let resolver = PathResolver::new(self.config.category_dir(layout));

        let relative = match (&layout.encoding, filename) {
            (ItemEncoding::Sidecar { .. }, None) => {
                return Err(ShelfError::not_found("file", format!("{}/", item.id)));
            }
            (ItemEncoding::Sidecar { .. }, Some(filename)) => {
                if filename.split(['/', '\\']).any(is_hidden) {
                    return Err(ShelfError::not_found("file", filename));
                }
                format!("{}/{}", item.entry, filename)
            }
            (ItemEncoding::Header { .. }, None) => item.entry.clone(),
            (ItemEncoding::Header { .. }, Some(filename)) => {
                if !filename.eq_ignore_ascii_case(&item.entry) {
                    return Err(ShelfError::not_found("file", filename));
                }
                item.entry.clone()
            }
        };

        let path = resolver.resolve(&relative, EntryKind::File).await?;
        let file = File::open(&path)
            .await
            .map_err(|e| ShelfError::scan(&path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| ShelfError::scan(&path, e))?
            .len();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.entry.clone());
        let content_type = content_type_for(&file_name, &layout.encoding);
        debug!(%category, id = %item.id, file = %file_name, len, "serving file");

        Ok(FileDownload {
            path,
            file_name,
            content_type,
            len,
            file,
        })
    }

    /// Prepare the archive download of an item. Nothing is read until the
    /// job is streamed.
    pub async fn download_archive(&self, category: Category, name: &str) -> Result<ArchiveJob> {
        check_identifier(name)?;

        let layout = self.layout(category)?;
        let IndexedItem { id, entry } = self.index.resolve(category, name).await?;
        let kind = match layout.encoding {
            ItemEncoding::Sidecar { .. } => EntryKind::Directory,
            ItemEncoding::Header { .. } => EntryKind::File,
        };

        let source = PathResolver::new(self.config.category_dir(layout))
            .resolve(&entry, kind)
            .await?;
        Ok(ArchiveJob::new(source, id, layout.format))
    }

    /// Run `request`, sending the response head and then the body to `sink`.
    ///
    /// Errors returned before the head was sent leave `sink` untouched, so
    /// the caller can still answer with [`ResponseHead::for_error`]. Failures
    /// after that point are [`ShelfError::ArchiveFailure`] and the body is
    /// truncated.
    pub async fn dispatch<S>(&self, request: &ApiRequest, sink: &mut S) -> Result<()>
    where
        S: ResponseSink + ?Sized,
    {
        match &request.operation {
            Operation::List => {
                let category = parse_category(request.category.as_deref())?;
                let descriptors = self.list(category).await?;
                send_json(sink, &descriptors).await
            }
            Operation::GetMetadataList => {
                let all = self.list_all().await?;
                send_json(sink, &all).await
            }
            Operation::GetFile { filename } => {
                let category = parse_category(request.category.as_deref())?;
                let name = identifier(request)?;
                let mut download = self.get_file(category, name, filename.as_deref()).await?;

                let head = ResponseHead::ok(download.content_type).with_length(download.len);
                sink.send_head(head).await.map_err(ShelfError::ArchiveFailure)?;
                tokio::io::copy(&mut download.file, sink)
                    .await
                    .map_err(ShelfError::ArchiveFailure)?;
                sink.flush().await.map_err(ShelfError::ArchiveFailure)
            }
            Operation::DownloadArchive => {
                let category = parse_category(request.category.as_deref())?;
                let name = identifier(request)?;
                let job = self.download_archive(category, name).await?;

                let head = ResponseHead::ok(job.content_type()).with_attachment(job.file_name());
                sink.send_head(head).await.map_err(ShelfError::ArchiveFailure)?;
                job.stream_to(&mut *sink).await.map(|_| ())
            }
        }
    }

    fn layout(&self, category: Category) -> Result<&CategoryLayout> {
        self.config
            .layout(category)
            .ok_or_else(|| ShelfError::not_found("category", category.as_str()))
    }
}

fn parse_category(name: Option<&str>) -> Result<Category> {
    name.ok_or_else(|| ShelfError::not_found("category", ""))?
        .parse()
}

fn identifier(request: &ApiRequest) -> Result<&str> {
    request
        .identifier
        .as_deref()
        .ok_or_else(|| ShelfError::not_found("item", ""))
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> Result<()>
where
    S: ResponseSink + ?Sized,
    T: serde::Serialize + ?Sized,
{
    let body =
        serde_json::to_vec(value).map_err(|e| ShelfError::ArchiveFailure(io::Error::from(e)))?;
    let head = ResponseHead::json().with_length(body.len() as u64);

    let sent = async {
        sink.send_head(head).await?;
        sink.write_all(&body).await?;
        sink.flush().await
    };
    sent.await.map_err(ShelfError::ArchiveFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn shelf() -> (TempDir, Shelf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("module")).unwrap();
        fs::create_dir_all(root.join("command")).unwrap();
        fs::create_dir_all(root.join("configs/Fluro/.git")).unwrap();

        fs::write(root.join("module/Zoom.lua"), "-- name = \"Zoom\"\nname = \"Zoom\"\n").unwrap();
        fs::write(root.join("configs/Fluro/main.json"), r#"{"name":"Fluro UI"}"#).unwrap();
        fs::write(root.join("configs/Fluro/icon.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(root.join("configs/Fluro/.git/HEAD"), "ref").unwrap();

        let shelf = Shelf::new(ShelfConfig::with_defaults(root));
        (temp, shelf)
    }

    #[tokio::test]
    async fn flat_item_serves_its_source() {
        let (_temp, shelf) = shelf();
        let download = shelf.get_file(Category::Module, "zoom", None).await.unwrap();
        assert_eq!(download.file_name, "Zoom.lua");
        assert_eq!(download.content_type, crate::api::CONTENT_TYPE_TEXT);

        let again = shelf
            .get_file(Category::Module, "ZOOM", Some("zoom.LUA"))
            .await
            .unwrap();
        assert_eq!(again.len, download.len);

        let err = shelf
            .get_file(Category::Module, "zoom", Some("other.lua"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::NotFound { .. }));
    }

    #[tokio::test]
    async fn directory_item_files() {
        let (_temp, shelf) = shelf();

        let icon = shelf
            .get_file(Category::Generic, "Fluro UI", Some("icon.png"))
            .await
            .unwrap();
        assert_eq!(icon.content_type, crate::api::CONTENT_TYPE_PNG);
        assert_eq!(icon.len, 4);

        for filename in [None, Some(".git/HEAD"), Some("missing.json")] {
            let err = shelf
                .get_file(Category::Generic, "fluro", filename)
                .await
                .unwrap_err();
            assert!(matches!(err, ShelfError::NotFound { .. }), "{filename:?}");
        }

        let err = shelf
            .get_file(Category::Generic, "fluro", Some("../../module/Zoom.lua"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn archive_jobs_follow_category_format() {
        let (_temp, shelf) = shelf();

        let job = shelf.download_archive(Category::Generic, "fluro ui").await.unwrap();
        assert_eq!(job.file_name(), "Fluro.zip");
        assert!(job.source_root.ends_with("configs/Fluro"));

        let job = shelf.download_archive(Category::Module, "zoom").await.unwrap();
        assert_eq!(job.file_name(), "Zoom.tar.gz");
        assert!(job.source_root.ends_with("module/Zoom.lua"));
    }

    #[tokio::test]
    async fn list_all_degrades_unreadable_categories() {
        let (temp, shelf) = shelf();
        fs::remove_dir_all(temp.path().join("command")).unwrap();

        let all = shelf.list_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[&Category::Command].is_empty());
        assert_eq!(all[&Category::Module][0].display_name, "Zoom");
    }
}
