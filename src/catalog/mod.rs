//! Item metadata and the per-category name index.
//!
//! - [`descriptor`]: categories and the descriptor record served to clients
//! - [`metadata`]: sidecar and embedded-header parsing
//! - [`index`]: lazily built, case-insensitive name → id lookup

mod descriptor;
mod index;
mod metadata;

pub use descriptor::{Category, ResourceDescriptor, normalize};
pub use index::{IndexedItem, ResourceIndex};
pub use metadata::{
    HeaderFields, HeaderScanner, HeaderState, ItemEncoding, parse_sidecar, read_header_file,
    read_sidecar, scan_header,
};
