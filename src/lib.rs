//! # scriptshelf
//!
//! Serves a directory tree of user scripts and configuration packs: lists
//! their metadata, resolves case-insensitive display names to items, serves
//! individual files and streams whole items as zip or tar.gz archives.
//!
//! ## Layout
//!
//! - `<root>/module/*.lua` and `<root>/command/*.lua`: one script per item,
//!   metadata in a leading header of `key = "value"` lines
//! - `<root>/configs/<item>/main.json`: one directory per item, metadata in
//!   a JSON sidecar
//!
//! Entries whose name starts with `.` are invisible to every operation.
//!
//! ## Example
//!
//! ```no_run
//! use scriptshelf::{Category, Shelf, ShelfConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let shelf = Shelf::new(ShelfConfig::with_defaults("/srv/shelf"));
//!
//!     for item in shelf.list(Category::Generic).await? {
//!         println!("{} by {}", item.display_name, item.author);
//!     }
//!
//!     let job = shelf.download_archive(Category::Generic, "fluro ui").await?;
//!     let file = tokio::fs::File::create(job.file_name()).await?;
//!     job.stream_to(file).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod resolve;
pub mod shelf;
pub mod walk;

pub use api::{ApiRequest, Operation, ResponseHead, ResponseSink};
pub use archive::{ArchiveFormat, ArchiveJob, ArchiveStats, stream_archive};
pub use catalog::{Category, ResourceDescriptor};
pub use cli::Cli;
pub use config::{CategoryLayout, ShelfConfig};
pub use error::{EntryKind, Result, ShelfError};
pub use shelf::{FileDownload, Shelf};
