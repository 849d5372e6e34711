use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ShelfError;

/// Partition of the corpus, each scanned from its own root directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Module,
    Command,
    Generic,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Module, Category::Command, Category::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Module => "module",
            Category::Command => "command",
            Category::Generic => "generic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "module" | "modules" => Ok(Category::Module),
            "command" | "commands" => Ok(Category::Command),
            "generic" | "config" | "configs" => Ok(Category::Generic),
            _ => Err(ShelfError::not_found("category", s)),
        }
    }
}

/// Parsed metadata for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Filesystem entry name: directory name, or file stem for flat files
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Index key for a display name or id
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_names() {
        assert_eq!("Module".parse::<Category>().unwrap(), Category::Module);
        assert_eq!("configs".parse::<Category>().unwrap(), Category::Generic);
        assert!(matches!(
            "plugins".parse::<Category>(),
            Err(ShelfError::NotFound { what: "category", .. })
        ));
    }

    #[test]
    fn serializes_with_wire_names() {
        let descriptor = ResourceDescriptor {
            id: "autoclicker".into(),
            display_name: "AutoClicker".into(),
            description: "Clicks for you".into(),
            author: "flarial".into(),
            category: Category::Module,
            version: None,
        };
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "id": "autoclicker",
                "name": "AutoClicker",
                "description": "Clicks for you",
                "author": "flarial",
                "type": "module",
            })
        );
    }

    #[test]
    fn normalization_only_folds_case() {
        assert_eq!(normalize("Fancy UI"), "fancy ui");
        assert_eq!(normalize(" Ärger "), " ärger ");
    }
}
