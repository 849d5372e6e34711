//! Descriptor extraction for the two item encodings.
//!
//! Directory items carry a JSON sidecar (`main.json` by default). Flat script
//! items carry `key = "value"` lines at the top of the source file. Neither
//! parser fails a scan: a broken item yields `None` and a warning.

use std::path::Path;

use serde_json::{Map, Value};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::descriptor::{Category, ResourceDescriptor};

/// How a category stores its items on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEncoding {
    /// One directory per item with a JSON descriptor inside
    Sidecar { file_name: String },
    /// One source file per item with an embedded header; `extension` has no dot
    Header { extension: String },
}

impl ItemEncoding {
    pub fn sidecar(file_name: impl Into<String>) -> Self {
        ItemEncoding::Sidecar {
            file_name: file_name.into(),
        }
    }

    pub fn header(extension: impl Into<String>) -> Self {
        ItemEncoding::Header {
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Item id for a flat file, `None` when the extension does not match
    pub fn flat_id<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let ItemEncoding::Header { extension } = self else {
            return None;
        };
        let (stem, ext) = file_name.rsplit_once('.')?;
        (!stem.is_empty() && ext.eq_ignore_ascii_case(extension)).then_some(stem)
    }
}

/// Fields recognized in either encoding
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
}

impl HeaderFields {
    fn into_descriptor(self, id: &str, category: Category) -> ResourceDescriptor {
        ResourceDescriptor {
            id: id.to_string(),
            display_name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.to_string()),
            description: self.description.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            category,
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    ReadingHeader,
    Done,
}

/// Line scanner for embedded headers.
///
/// Blank lines and comments are skipped, `key = value` lines are collected,
/// and the first line that is neither ends the header.
#[derive(Debug)]
pub struct HeaderScanner {
    state: HeaderState,
    fields: HeaderFields,
}

const COMMENT_PREFIXES: [&str; 3] = ["--", "#", "//"];

impl Default for HeaderScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderScanner {
    pub fn new() -> Self {
        Self {
            state: HeaderState::ReadingHeader,
            fields: HeaderFields::default(),
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    pub fn feed(&mut self, line: &str) -> HeaderState {
        if self.state == HeaderState::Done {
            return self.state;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return self.state;
        }

        match parse_assignment(trimmed) {
            Some((key, value)) => {
                let slot = match key {
                    "name" => &mut self.fields.name,
                    "description" => &mut self.fields.description,
                    "author" => &mut self.fields.author,
                    "version" => &mut self.fields.version,
                    _ => return self.state,
                };
                *slot = Some(value);
            }
            None => self.state = HeaderState::Done,
        }

        self.state
    }

    pub fn finish(self) -> HeaderFields {
        self.fields
    }
}

/// Split `key = value` where key is an identifier
fn parse_assignment(line: &str) -> Option<(&str, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();

    let mut chars = key.chars();
    let head = chars.next()?;
    if !(head.is_ascii_alphabetic() || head == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    Some((key, clean_value(value)))
}

fn clean_value(raw: &str) -> String {
    let value = raw.trim().trim_end_matches([',', ';']).trim_end();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Parse header fields out of a script source already in memory
pub fn scan_header(source: &str) -> HeaderFields {
    let mut scanner = HeaderScanner::new();
    for line in source.lines() {
        if scanner.feed(line) == HeaderState::Done {
            break;
        }
    }
    scanner.finish()
}

/// Read a flat script item. Reading stops at the end of the header, so large
/// sources are not loaded in full.
pub async fn read_header_file(
    path: &Path,
    id: &str,
    category: Category,
) -> Option<ResourceDescriptor> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable script, skipping");
            return None;
        }
    };

    let mut lines = BufReader::new(file).split(b'\n');
    let mut scanner = HeaderScanner::new();
    loop {
        match lines.next_segment().await {
            Ok(Some(raw)) => {
                if scanner.feed(&String::from_utf8_lossy(&raw)) == HeaderState::Done {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                // The header read so far is still usable.
                warn!(path = %path.display(), error = %e, "stopped reading script header");
                break;
            }
        }
    }

    Some(scanner.finish().into_descriptor(id, category))
}

/// Parse a JSON sidecar. Only objects are accepted; string, number and bool
/// values are taken for the known keys, anything else is ignored.
pub fn parse_sidecar(content: &[u8]) -> serde_json::Result<HeaderFields> {
    let object: Map<String, Value> = serde_json::from_slice(content)?;
    let field = |key: &str| match object.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };

    Ok(HeaderFields {
        name: field("name"),
        description: field("description"),
        author: field("author"),
        version: field("version"),
    })
}

/// Read a directory item's sidecar
pub async fn read_sidecar(
    dir: &Path,
    file_name: &str,
    id: &str,
    category: Category,
) -> Option<ResourceDescriptor> {
    let path = dir.join(file_name);
    let content = match fs::read(&path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "missing or unreadable descriptor, skipping");
            return None;
        }
    };

    match parse_sidecar(&content) {
        Ok(fields) => Some(fields.into_descriptor(id, category)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid descriptor, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCRIPT: &str = r#"-- AutoClicker for Flarial
name = "AutoClicker"
description = 'Clicks, fast'
author = "flarial"

version = 1.2;
icon = "cursor"

function onEnable()
    name = "shadowed"
end
"#;

    #[test]
    fn header_stops_at_first_code_line() {
        let fields = scan_header(SCRIPT);
        assert_eq!(fields.name.as_deref(), Some("AutoClicker"));
        assert_eq!(fields.description.as_deref(), Some("Clicks, fast"));
        assert_eq!(fields.author.as_deref(), Some("flarial"));
        assert_eq!(fields.version.as_deref(), Some("1.2"));
    }

    #[test]
    fn scanner_states() {
        let mut scanner = HeaderScanner::new();
        assert_eq!(scanner.feed("# comment"), HeaderState::ReadingHeader);
        assert_eq!(scanner.feed("  "), HeaderState::ReadingHeader);
        assert_eq!(scanner.feed("local x = 1"), HeaderState::Done);
        assert_eq!(scanner.feed("name = \"late\""), HeaderState::Done);
        assert_eq!(scanner.finish(), HeaderFields::default());
    }

    #[test]
    fn repeated_keys_keep_last_value() {
        let fields = scan_header("name = \"First\"\nname = \"Second\"\n");
        assert_eq!(fields.name.as_deref(), Some("Second"));
    }

    #[test]
    fn flat_id_matches_extension() {
        let encoding = ItemEncoding::header(".lua");
        assert_eq!(encoding.flat_id("Zoom.lua"), Some("Zoom"));
        assert_eq!(encoding.flat_id("Zoom.LUA"), Some("Zoom"));
        assert_eq!(encoding.flat_id("notes.txt"), None);
        assert_eq!(encoding.flat_id(".lua"), None);
        assert_eq!(ItemEncoding::sidecar("main.json").flat_id("a.lua"), None);
    }

    #[test]
    fn sidecar_fields() {
        let json = br#"{"name": " Fluro ", "version": 2, "colors": {"a": 1}}"#;
        let fields = parse_sidecar(json).unwrap();
        assert_eq!(fields.name.as_deref(), Some("Fluro"));
        assert_eq!(fields.version.as_deref(), Some("2"));
        assert_eq!(fields.author, None);

        assert!(parse_sidecar(b"[1, 2]").is_err());
        assert!(parse_sidecar(b"{not json").is_err());
    }

    #[tokio::test]
    async fn header_file_without_name_falls_back_to_stem() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Zoom.lua");
        std::fs::write(&path, "print('zoom')\n").unwrap();

        let descriptor = read_header_file(&path, "Zoom", Category::Command).await.unwrap();
        assert_eq!(descriptor.id, "Zoom");
        assert_eq!(descriptor.display_name, "Zoom");
        assert_eq!(descriptor.category, Category::Command);
    }

    #[tokio::test]
    async fn sidecar_without_name_uses_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("main.json"), r#"{"author": "me"}"#).unwrap();

        let descriptor = read_sidecar(temp.path(), "main.json", "Monsoon", Category::Generic)
            .await
            .unwrap();
        assert_eq!(descriptor.display_name, "Monsoon");
        assert_eq!(descriptor.author, "me");

        let missing = read_sidecar(temp.path(), "absent.json", "Monsoon", Category::Generic).await;
        assert!(missing.is_none());
    }
}
