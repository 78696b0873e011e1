//! Catalog file parser supporting CSV, JSON and XLSX.
//!
//! CSV and XLSX require a header row; every following row becomes a
//! column → value map. JSON accepts either an array of row objects or a
//! workspace export, in which case its `fieldsCatalog` array is used.
//! Blank rows are skipped; malformed records are reported per index.

use std::io::Cursor;

use anyhow::Context;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use serde_json::Value;

use crate::parsers::{InputFormat, ParseError, ParseResult, Parser, RawRow};

/// Parser for catalog exports from source and target systems.
#[derive(Debug, Default)]
pub struct CatalogFileParser;

impl CatalogFileParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for CatalogFileParser {
    fn parse(&self, data: &[u8], format: InputFormat) -> Result<ParseResult, anyhow::Error> {
        match format {
            InputFormat::Csv => self.parse_csv(data),
            InputFormat::Json => self.parse_json(data),
            InputFormat::Xlsx => self.parse_xlsx(data),
        }
    }

    fn supported_formats(&self) -> &[InputFormat] {
        &[InputFormat::Csv, InputFormat::Json, InputFormat::Xlsx]
    }
}

impl CatalogFileParser {
    fn parse_csv(&self, data: &[u8]) -> Result<ParseResult, anyhow::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .context("Invalid CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            anyhow::bail!("CSV file has no header row");
        }

        let mut rows = Vec::new();
        let mut errors = Vec::new();

        for (i, result) in reader.records().enumerate() {
            match result {
                Ok(record) => {
                    let row: RawRow = headers
                        .iter()
                        .zip(record.iter())
                        .filter(|(header, _)| !header.is_empty())
                        .map(|(header, value)| (header.clone(), Value::String(value.to_string())))
                        .collect();
                    if !is_blank(&row) {
                        rows.push(row);
                    }
                }
                Err(e) => errors.push(ParseError {
                    record_index: i,
                    field: "csv_row".to_string(),
                    message: format!("CSV parse error: {e}"),
                }),
            }
        }

        Ok(ParseResult {
            rows,
            errors,
            format: InputFormat::Csv,
        })
    }

    fn parse_json(&self, data: &[u8]) -> Result<ParseResult, anyhow::Error> {
        let value: Value = serde_json::from_slice(data).context("Invalid JSON")?;

        let records = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("fieldsCatalog") {
                Some(Value::Array(items)) => items,
                _ => anyhow::bail!("JSON catalog must be an array of rows or contain a fieldsCatalog array"),
            },
            _ => anyhow::bail!("JSON catalog must be an array of rows"),
        };

        let mut rows = Vec::new();
        let mut errors = Vec::new();

        for (i, record) in records.into_iter().enumerate() {
            match record {
                Value::Object(row) => {
                    if !is_blank(&row) {
                        rows.push(row);
                    }
                }
                other => errors.push(ParseError {
                    record_index: i,
                    field: "json_row".to_string(),
                    message: format!("Expected an object, found {}", json_kind(&other)),
                }),
            }
        }

        Ok(ParseResult {
            rows,
            errors,
            format: InputFormat::Json,
        })
    }

    fn parse_xlsx(&self, data: &[u8]) -> Result<ParseResult, anyhow::Error> {
        let cursor = Cursor::new(data);
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(cursor).map_err(|e| anyhow::anyhow!("Invalid XLSX file: {e}"))?;

        // Use first sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("XLSX file has no sheets"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| anyhow::anyhow!("Failed to read sheet '{sheet_name}': {e}"))?;

        let mut row_iter = range.rows();

        let header_row = row_iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("XLSX sheet is empty"))?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for cells in row_iter {
            let row: RawRow = headers
                .iter()
                .zip(cells.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), cell_value(cell)))
                .collect();
            if !is_blank(&row) {
                rows.push(row);
            }
        }

        Ok(ParseResult {
            rows,
            errors: Vec::new(),
            format: InputFormat::Xlsx,
        })
    }
}

/// Convert a spreadsheet cell, keeping booleans typed.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Bool(b) => Value::Bool(*b),
        Data::Empty => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

/// True when every value in the row is null or an empty/whitespace string.
fn is_blank(row: &RawRow) -> bool {
    row.values().all(|v| match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
