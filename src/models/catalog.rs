//! Catalog import metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Strategy chosen by the user when confirming a catalog import.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    /// The imported batch becomes the whole catalog.
    #[default]
    Replace,
    /// The imported batch updates and extends the existing catalog.
    Merge,
}

impl std::fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Describes the most recent catalog import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMeta {
    pub filename: String,
    pub record_count: usize,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub import_strategy: ImportStrategy,
    #[serde(default = "first_version")]
    pub version: u32,
}

fn first_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_meta_uses_camel_case() {
        let meta = CatalogMeta {
            filename: "centric.csv".to_string(),
            record_count: 12,
            uploaded_at: Utc::now(),
            file_size: Some(2048),
            import_strategy: ImportStrategy::Merge,
            version: 3,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["recordCount"], 12);
        assert_eq!(json["importStrategy"], "merge");
        assert_eq!(json["fileSize"], 2048);
    }

    #[test]
    fn strategy_display() {
        assert_eq!(ImportStrategy::Replace.to_string(), "replace");
        assert_eq!(ImportStrategy::default(), ImportStrategy::Replace);
    }
}
