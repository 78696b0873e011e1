//! Catalog file parsers and the field normalizer.
//!
//! Parsers turn raw file bytes (CSV, JSON, XLSX) into loosely typed rows;
//! the normalizer maps each row onto a canonical [`Field`](crate::models::field::Field).

pub mod catalog;
pub mod normalize;

use serde::{Deserialize, Serialize};

/// One raw record: column name → value, exactly as the file supplied it.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Result of parsing a catalog file.
#[derive(Debug)]
pub struct ParseResult {
    pub rows: Vec<RawRow>,
    pub errors: Vec<ParseError>,
    pub format: InputFormat,
}

/// Error encountered while parsing or normalizing an individual record.
#[derive(Debug, Clone, Serialize)]
pub struct ParseError {
    pub record_index: usize,
    pub field: String,
    pub message: String,
}

/// Input format for catalog data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Json,
    Csv,
    Xlsx,
}

impl InputFormat {
    /// Detect format from filename extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".csv") {
            Some(Self::Csv)
        } else if lower.ends_with(".json") {
            Some(Self::Json)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Some(Self::Xlsx)
        } else {
            None
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
            Self::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Trait for pluggable catalog file parsers.
pub trait Parser: Send + Sync {
    /// Parse raw file bytes into rows, collecting per-record errors.
    fn parse(&self, data: &[u8], format: InputFormat) -> Result<ParseResult, anyhow::Error>;

    /// Formats this parser accepts.
    fn supported_formats(&self) -> &[InputFormat];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection() {
        assert_eq!(InputFormat::from_filename("centric.csv"), Some(InputFormat::Csv));
        assert_eq!(InputFormat::from_filename("CATALOG.JSON"), Some(InputFormat::Json));
        assert_eq!(InputFormat::from_filename("fulfil.xlsx"), Some(InputFormat::Xlsx));
        assert_eq!(InputFormat::from_filename("fulfil.xls"), Some(InputFormat::Xlsx));
        assert_eq!(InputFormat::from_filename("notes.txt"), None);
    }

    #[test]
    fn parse_error_serialization() {
        let err = ParseError {
            record_index: 5,
            field: "system".to_string(),
            message: "Missing system".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["record_index"], 5);
        assert_eq!(json["field"], "system");
    }
}
