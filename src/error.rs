use std::fmt;
use std::io;
use std::path::PathBuf;

use serde_json::{Value, json};
use thiserror::Error;

/// Kind of filesystem entry an operation expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
        }
    }
}

/// Errors surfaced by the index, resolver and archive streamer.
///
/// The first three variants are caused by the request and map to 4xx
/// statuses; the last two indicate a deployment or I/O problem.
#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("{name} is not a {expected}")]
    InvalidKind { name: String, expected: EntryKind },

    #[error("failed to scan {}: {source}", path.display())]
    ScanFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive stream failed: {0}")]
    ArchiveFailure(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ShelfError>;

impl ShelfError {
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        ShelfError::NotFound {
            what,
            name: name.into(),
        }
    }

    pub fn scan(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ShelfError::ScanFailure {
            path: path.into(),
            source,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ShelfError::InvalidPath(_)
                | ShelfError::NotFound { .. }
                | ShelfError::InvalidKind { .. }
        )
    }

    /// HTTP status the routing layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ShelfError::InvalidPath(_) | ShelfError::InvalidKind { .. } => 400,
            ShelfError::NotFound { .. } => 404,
            ShelfError::ScanFailure { .. } | ShelfError::ArchiveFailure(_) => 500,
        }
    }

    /// JSON body for an error response. Server errors are not echoed verbatim
    /// since their messages carry local paths.
    pub fn to_json(&self) -> Value {
        if self.is_client_error() {
            json!({ "error": self.to_string() })
        } else {
            json!({ "error": "Internal server error" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(ShelfError::InvalidPath("../x".into()).status_code(), 400);
        assert_eq!(ShelfError::not_found("item", "foo").status_code(), 404);
        let kind = ShelfError::InvalidKind {
            name: "foo".into(),
            expected: EntryKind::Directory,
        };
        assert_eq!(kind.status_code(), 400);
        assert_eq!(kind.to_string(), "foo is not a directory");
        assert!(kind.is_client_error());
    }

    #[test]
    fn server_errors_hide_details() {
        let err = ShelfError::scan("/srv/shelf", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_client_error());
        assert_eq!(err.to_json(), json!({ "error": "Internal server error" }));

        let err = ShelfError::not_found("category", "plugins");
        assert_eq!(err.to_json(), json!({ "error": "category not found: plugins" }));
    }
}
