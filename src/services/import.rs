//! Catalog import pipeline.
//!
//! Parses an uploaded catalog file, normalizes every row, rejects rows
//! without a full `system.object.field` identity, de-duplicates the batch
//! and counts conflicts. The prepared batch can be previewed before it is
//! reconciled into the workspace with the chosen strategy.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::catalog::{CatalogMeta, ImportStrategy};
use crate::models::field::Field;
use crate::models::workspace::WorkspaceState;
use crate::parsers::catalog::CatalogFileParser;
use crate::parsers::normalize::{normalize_field, NormalizeOptions};
use crate::parsers::{InputFormat, ParseError, Parser};
use crate::services::reconcile::{self, ReconcileStats, RelinkSummary};

/// A parsed, normalized and de-duplicated batch awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PreparedImport {
    pub filename: String,
    pub file_size: u64,
    pub format: InputFormat,
    pub fields: Vec<Field>,
    pub errors: Vec<ParseError>,
    /// Imported fields whose `originId` already exists in the catalog.
    pub conflicts: usize,
}

/// What the user sees before choosing a strategy.
#[derive(Debug, Serialize)]
pub struct ImportPreview {
    pub filename: String,
    pub format: InputFormat,
    pub record_count: usize,
    pub conflicts: usize,
    /// Rows that would lose a side if the batch replaced the catalog.
    pub rows_at_risk: usize,
    pub errors: Vec<ParseError>,
}

/// Summary of an applied import.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub filename: String,
    pub format: InputFormat,
    pub strategy: ImportStrategy,
    pub record_count: usize,
    pub conflicts: usize,
    pub catalog_size: usize,
    #[serde(flatten)]
    pub stats: ReconcileStats,
    pub relink: RelinkSummary,
    pub catalog_version: u32,
    #[serde(rename = "errors")]
    pub error_count: usize,
    pub error_details: Vec<ParseError>,
}

/// Parse and normalize a catalog file against the current workspace.
pub fn prepare(
    state: &WorkspaceState,
    filename: &str,
    data: &[u8],
    format: Option<InputFormat>,
    now: DateTime<Utc>,
) -> Result<PreparedImport, AppError> {
    // 1. Select format
    let format = format
        .or_else(|| InputFormat::from_filename(filename))
        .ok_or_else(|| {
            AppError::Import(format!(
                "Unsupported catalog file '{filename}': expected .csv, .json or .xlsx"
            ))
        })?;

    // 2. Parse raw data
    let parser = CatalogFileParser::new();
    let parse_result = parser
        .parse(data, format)
        .map_err(|e| AppError::Import(format!("Failed to parse {filename}: {e:#}")))?;

    let mut errors = parse_result.errors;

    // 3. Normalize and reject incomplete rows
    let options = NormalizeOptions::import(now);
    let mut fields = Vec::with_capacity(parse_result.rows.len());
    for (i, row) in parse_result.rows.iter().enumerate() {
        let normalized = normalize_field(row, i, &options);
        match normalized.missing_identity() {
            Some(attribute) => errors.push(ParseError {
                record_index: normalized.row_index,
                field: attribute.to_string(),
                message: format!("Missing {attribute}"),
            }),
            None => fields.push(normalized.field),
        }
    }

    // 4. De-duplicate within the batch and count conflicts
    let fields = reconcile::dedupe_batch(fields);
    let conflicts = reconcile::conflict_count(&fields, &state.fields_catalog);

    tracing::info!(
        filename,
        format = %format,
        records = fields.len(),
        rejected = errors.len(),
        conflicts,
        "Catalog file prepared"
    );

    Ok(PreparedImport {
        filename: filename.to_string(),
        file_size: data.len() as u64,
        format,
        fields,
        errors,
        conflicts,
    })
}

impl PreparedImport {
    pub fn preview(&self, state: &WorkspaceState) -> ImportPreview {
        ImportPreview {
            filename: self.filename.clone(),
            format: self.format,
            record_count: self.fields.len(),
            conflicts: self.conflicts,
            rows_at_risk: reconcile::rows_at_risk(state.mapping_rows(), &self.fields),
            errors: self.errors.clone(),
        }
    }
}

/// Reconcile a prepared batch into the workspace and re-link every row.
pub fn apply(
    state: &mut WorkspaceState,
    prepared: PreparedImport,
    strategy: ImportStrategy,
    now: DateTime<Utc>,
) -> ImportSummary {
    let record_count = prepared.fields.len();
    let reconciliation = reconcile::reconcile(&state.fields_catalog, prepared.fields, strategy, now);
    let relink = reconcile::relink_rows(state, &reconciliation);

    let catalog_version = state.catalog_meta.as_ref().map_or(0, |m| m.version).saturating_add(1);
    state.catalog_meta = Some(CatalogMeta {
        filename: prepared.filename.clone(),
        record_count,
        uploaded_at: now,
        file_size: Some(prepared.file_size),
        import_strategy: strategy,
        version: catalog_version,
    });
    state.fields_catalog = reconciliation.catalog;

    tracing::info!(
        filename = %prepared.filename,
        strategy = %strategy,
        updated = reconciliation.stats.updated,
        added = reconciliation.stats.added,
        retained = reconciliation.stats.retained,
        dropped = reconciliation.stats.dropped,
        cleared = relink.cleared,
        pruned = relink.pruned,
        catalog_version,
        "Catalog import applied"
    );

    ImportSummary {
        filename: prepared.filename,
        format: prepared.format,
        strategy,
        record_count,
        conflicts: prepared.conflicts,
        catalog_size: state.fields_catalog.len(),
        stats: reconciliation.stats,
        relink,
        catalog_version,
        error_count: prepared.errors.len(),
        error_details: prepared.errors,
    }
}

/// Prepare and apply in one step.
pub fn import_file(
    state: &mut WorkspaceState,
    filename: &str,
    data: &[u8],
    format: Option<InputFormat>,
    strategy: ImportStrategy,
) -> Result<ImportSummary, AppError> {
    let now = Utc::now();
    let prepared = prepare(state, filename, data, format, now)?;
    Ok(apply(state, prepared, strategy, now))
}
