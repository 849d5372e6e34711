//! Types exchanged with the HTTP layer.
//!
//! Routing, CORS and the listener live outside this crate. The HTTP layer
//! turns a request into an [`ApiRequest`], hands [`Shelf::dispatch`] a
//! [`ResponseSink`], and maps any returned [`ShelfError`] with
//! [`ResponseHead::for_error`] as long as no head was sent yet.
//!
//! [`Shelf::dispatch`]: crate::Shelf::dispatch

use std::io;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWrite;

use crate::catalog::ItemEncoding;
use crate::error::ShelfError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Descriptors of one category
    List,
    /// Descriptors of every configured category, keyed by category
    GetMetadataList,
    /// A file of an item; `None` asks for a flat item's source file
    GetFile { filename: Option<String> },
    DownloadArchive,
}

/// A request already matched by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub category: Option<String>,
    pub identifier: Option<String>,
    pub operation: Operation,
}

impl ApiRequest {
    pub fn list(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            identifier: None,
            operation: Operation::List,
        }
    }

    pub fn metadata_list() -> Self {
        Self {
            category: None,
            identifier: None,
            operation: Operation::GetMetadataList,
        }
    }

    pub fn get_file(
        category: impl Into<String>,
        identifier: impl Into<String>,
        filename: Option<String>,
    ) -> Self {
        Self {
            category: Some(category.into()),
            identifier: Some(identifier.into()),
            operation: Operation::GetFile { filename },
        }
    }

    pub fn download(category: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            identifier: Some(identifier.into()),
            operation: Operation::DownloadArchive,
        }
    }
}

/// Status and headers sent before the first body byte
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseHead {
    pub status: u16,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// File name offered for download, if the body is an attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl ResponseHead {
    pub fn ok(content_type: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            content_length: None,
            attachment: None,
        }
    }

    pub fn json() -> Self {
        Self::ok(CONTENT_TYPE_JSON)
    }

    pub fn with_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    pub fn with_attachment(mut self, file_name: impl Into<String>) -> Self {
        self.attachment = Some(file_name.into());
        self
    }

    /// Head for an error raised before streaming started; the body is
    /// [`ShelfError::to_json`]
    pub fn for_error(err: &ShelfError) -> Self {
        Self {
            status: err.status_code(),
            ..Self::json()
        }
    }

    /// `Content-Disposition` value for attachments
    pub fn content_disposition(&self) -> Option<String> {
        self.attachment.as_deref().map(content_disposition)
    }
}

/// `attachment; filename="<name>"` with quotes, backslashes and control
/// characters replaced by `_`
pub fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if matches!(c, '"' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

/// Response body destination. The head must be sent exactly once, before
/// any body bytes are written.
#[async_trait]
pub trait ResponseSink: AsyncWrite + Unpin + Send {
    async fn send_head(&mut self, head: ResponseHead) -> io::Result<()>;
}

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_PNG: &str = "image/png";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Content type from a file name's extension. Files with the category's
/// script extension are served as text.
pub fn content_type_for(file_name: &str, encoding: &ItemEncoding) -> &'static str {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return CONTENT_TYPE_BINARY;
    };

    if let ItemEncoding::Header { extension } = encoding {
        if ext.eq_ignore_ascii_case(extension) {
            return CONTENT_TYPE_TEXT;
        }
    }

    match ext.to_ascii_lowercase().as_str() {
        "json" => CONTENT_TYPE_JSON,
        "lua" => CONTENT_TYPE_TEXT,
        "png" => CONTENT_TYPE_PNG,
        _ => CONTENT_TYPE_BINARY,
    }
}
