//! Case-insensitive name → id index over the category roots.
//!
//! Each category owns one cached map behind its own async mutex. The map is
//! filled on first lookup and replaced by every listing, always from a full
//! rescan. Nothing watches the filesystem: after the first scan the map can
//! go stale until the next listing of that category.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::descriptor::{Category, ResourceDescriptor, normalize};
use super::metadata::{ItemEncoding, read_header_file, read_sidecar};
use crate::config::ShelfConfig;
use crate::error::{Result, ShelfError};
use crate::walk::{Visitor, WalkEntry, Walker};

/// An indexed item: its id and the filesystem entry holding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedItem {
    pub id: String,
    /// Directory name, or file name including extension for flat items
    pub entry: String,
}

#[derive(Debug, Default)]
struct NameMap {
    by_name: HashMap<String, IndexedItem>,
    by_id: HashMap<String, IndexedItem>,
}

impl NameMap {
    fn build(category: Category, scanned: &[(ResourceDescriptor, String)]) -> Self {
        let mut map = NameMap::default();
        for (descriptor, entry) in scanned {
            let item = IndexedItem {
                id: descriptor.id.clone(),
                entry: entry.clone(),
            };

            // Duplicate display names keep the last scanned entry. Kept for
            // compatibility with the legacy listing; see DESIGN.md.
            if let Some(previous) = map
                .by_name
                .insert(normalize(&descriptor.display_name), item.clone())
            {
                if previous.id != descriptor.id {
                    debug!(
                        %category,
                        name = %descriptor.display_name,
                        replaced = %previous.id,
                        by = %descriptor.id,
                        "duplicate display name, last scanned wins"
                    );
                }
            }
            map.by_id.insert(normalize(&descriptor.id), item);
        }
        map
    }

    /// Ids take precedence, so every listed id reaches its own item even
    /// when it equals another item's display name.
    fn lookup(&self, name: &str) -> Option<&IndexedItem> {
        let key = normalize(name);
        self.by_id.get(&key).or_else(|| self.by_name.get(&key))
    }
}

struct CategoryIndex {
    category: Category,
    dir: PathBuf,
    encoding: ItemEncoding,
    names: Mutex<Option<NameMap>>,
    #[cfg(test)]
    scans: AtomicUsize,
}

impl CategoryIndex {
    async fn scan(&self) -> Result<(Vec<ResourceDescriptor>, NameMap)> {
        #[cfg(test)]
        self.scans.fetch_add(1, Ordering::SeqCst);

        let mut visitor = ScanVisitor {
            category: self.category,
            encoding: &self.encoding,
            scanned: Vec::new(),
        };

        Walker::new(&self.dir)
            .max_depth(1)
            .walk(&mut visitor)
            .await
            .map_err(|e| ShelfError::scan(&self.dir, e))?;

        let map = NameMap::build(self.category, &visitor.scanned);
        debug!(
            category = %self.category,
            dir = %self.dir.display(),
            items = visitor.scanned.len(),
            "scanned category"
        );
        let descriptors = visitor.scanned.into_iter().map(|(d, _)| d).collect();
        Ok((descriptors, map))
    }
}

struct ScanVisitor<'a> {
    category: Category,
    encoding: &'a ItemEncoding,
    scanned: Vec<(ResourceDescriptor, String)>,
}

#[async_trait]
impl<'a> Visitor for ScanVisitor<'a> {
    async fn visit(&mut self, entry: &WalkEntry) -> io::Result<()> {
        let descriptor = match self.encoding {
            ItemEncoding::Sidecar { file_name } if entry.is_dir() => {
                read_sidecar(&entry.path, file_name, &entry.name, self.category).await
            }
            ItemEncoding::Header { .. } if !entry.is_dir() => {
                match self.encoding.flat_id(&entry.name) {
                    Some(id) => read_header_file(&entry.path, id, self.category).await,
                    None => None,
                }
            }
            _ => None,
        };

        if let Some(descriptor) = descriptor {
            self.scanned.push((descriptor, entry.name.clone()));
        }
        Ok(())
    }
}

/// Per-category item index. Owned by [`Shelf`](crate::Shelf); no other
/// component mutates it.
pub struct ResourceIndex {
    categories: Vec<CategoryIndex>,
}

impl ResourceIndex {
    pub fn new(config: &ShelfConfig) -> Self {
        let categories = config
            .categories
            .iter()
            .map(|layout| CategoryIndex {
                category: layout.category,
                dir: config.category_dir(layout),
                encoding: layout.encoding.clone(),
                names: Mutex::new(None),
                #[cfg(test)]
                scans: AtomicUsize::new(0),
            })
            .collect();
        Self { categories }
    }

    fn slot(&self, category: Category) -> Result<&CategoryIndex> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .ok_or_else(|| ShelfError::not_found("category", category.as_str()))
    }

    /// Directory scanned for `category`
    pub fn category_dir(&self, category: Category) -> Result<&Path> {
        Ok(&self.slot(category)?.dir)
    }

    /// Rescan a category, replace its cached map and return every item with
    /// usable metadata, in filesystem order.
    ///
    /// # Errors
    ///
    /// [`ShelfError::ScanFailure`] if the category directory cannot be read.
    /// Broken items are skipped, never reported.
    pub async fn list_category(&self, category: Category) -> Result<Vec<ResourceDescriptor>> {
        let slot = self.slot(category)?;
        let mut names = slot.names.lock().await;
        let (descriptors, map) = slot.scan().await?;
        *names = Some(map);
        Ok(descriptors)
    }

    /// Map an id (or display name) to the item, ignoring case.
    ///
    /// Populates the category on first use. Concurrent first lookups wait on
    /// the category lock instead of scanning twice.
    pub async fn resolve(&self, category: Category, name: &str) -> Result<IndexedItem> {
        let slot = self.slot(category)?;
        let mut names = slot.names.lock().await;
        if names.is_none() {
            let (_, map) = slot.scan().await?;
            *names = Some(map);
        }

        names
            .as_ref()
            .and_then(|map| map.lookup(name))
            .cloned()
            .ok_or_else(|| ShelfError::not_found("item", name))
    }
}
