use std::path::{Path, PathBuf};

use crate::archive::ArchiveFormat;
use crate::catalog::{Category, ItemEncoding};

/// On-disk layout and download format of one category
#[derive(Debug, Clone)]
pub struct CategoryLayout {
    pub category: Category,
    /// Directory of the category, relative to the shelf root or absolute
    pub dir: PathBuf,
    pub encoding: ItemEncoding,
    pub format: ArchiveFormat,
}

#[derive(Debug, Clone)]
pub struct ShelfConfig {
    pub root: PathBuf,
    pub categories: Vec<CategoryLayout>,
}

pub const DEFAULT_SCRIPT_EXTENSION: &str = "lua";
pub const DEFAULT_SIDECAR: &str = "main.json";

impl ShelfConfig {
    /// `module/` and `command/` hold flat `.lua` scripts served as tar.gz,
    /// `configs/` holds sidecar directories served as zip.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            categories: vec![
                CategoryLayout {
                    category: Category::Module,
                    dir: PathBuf::from("module"),
                    encoding: ItemEncoding::header(DEFAULT_SCRIPT_EXTENSION),
                    format: ArchiveFormat::TarGz,
                },
                CategoryLayout {
                    category: Category::Command,
                    dir: PathBuf::from("command"),
                    encoding: ItemEncoding::header(DEFAULT_SCRIPT_EXTENSION),
                    format: ArchiveFormat::TarGz,
                },
                CategoryLayout {
                    category: Category::Generic,
                    dir: PathBuf::from("configs"),
                    encoding: ItemEncoding::sidecar(DEFAULT_SIDECAR),
                    format: ArchiveFormat::Zip,
                },
            ],
        }
    }

    pub fn layout(&self, category: Category) -> Option<&CategoryLayout> {
        self.categories.iter().find(|l| l.category == category)
    }

    pub fn layout_mut(&mut self, category: Category) -> Option<&mut CategoryLayout> {
        self.categories.iter_mut().find(|l| l.category == category)
    }

    /// Absolute-or-root-relative directory of a category
    pub fn category_dir(&self, layout: &CategoryLayout) -> PathBuf {
        join_root(&self.root, &layout.dir)
    }
}

fn join_root(root: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_category() {
        let config = ShelfConfig::with_defaults("/srv/shelf");
        for category in Category::ALL {
            assert!(config.layout(category).is_some(), "{category}");
        }

        let generic = config.layout(Category::Generic).unwrap();
        assert_eq!(config.category_dir(generic), PathBuf::from("/srv/shelf/configs"));
        assert_eq!(generic.format, ArchiveFormat::Zip);
    }

    #[test]
    fn absolute_dirs_ignore_root() {
        let mut config = ShelfConfig::with_defaults("/srv/shelf");
        config.layout_mut(Category::Module).unwrap().dir = PathBuf::from("/opt/modules");
        let module = config.layout(Category::Module).unwrap();
        assert_eq!(config.category_dir(module), PathBuf::from("/opt/modules"));
    }
}
