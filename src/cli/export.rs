//! `icd export …`: mapping CSV, data contract and integration profile.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::output;
use crate::errors::AppError;
use crate::models::mapping::MappingRow;
use crate::models::workspace::WorkspaceState;
use crate::services::{export, hierarchy};
use crate::AppState;

#[derive(Debug, Args)]
pub struct Scope {
    /// Export every map of this flow.
    #[arg(long, conflicts_with = "map")]
    pub flow: Option<String>,
    /// Export a single map (defaults to the active map).
    #[arg(long)]
    pub map: Option<String>,
    /// Write to this file, or into this directory under the suggested name.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Flattened mapping CSV.
    Csv(Scope),
    /// Nested JSON data contract.
    Contract(Scope),
    /// Path-oriented integration profile.
    Profile(Scope),
}

pub fn run(app: &mut AppState, command: ExportCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    match command {
        ExportCommand::Csv(scope) => {
            let (_, rows) = collect(&app.workspace, &scope)?;
            let csv = export::mappings_csv(&rows)?;
            deliver(&scope, export::MAPPINGS_CSV_FILENAME, rows.len(), Value::String(csv.clone()), &csv)
        }
        ExportCommand::Contract(scope) => {
            let (flow_id, rows) = collect(&app.workspace, &scope)?;
            let contract = export::data_contract(&rows, &flow_id, now);
            deliver_json(&scope, &export::data_contract_filename(&flow_id), rows.len(), &contract)
        }
        ExportCommand::Profile(scope) => {
            let (flow_id, rows) = collect(&app.workspace, &scope)?;
            let profile = export::integration_profile(&rows, &flow_id, now);
            deliver_json(&scope, &export::integration_profile_filename(&flow_id), rows.len(), &profile)
        }
    }
}

/// Flow id and rows in scope: all maps of a flow in order, or one map.
fn collect(state: &WorkspaceState, scope: &Scope) -> Result<(String, Vec<MappingRow>), AppError> {
    if let Some(flow_id) = scope.flow.as_deref() {
        let flow = state
            .find_flow(flow_id)
            .ok_or_else(|| AppError::NotFound(format!("Flow {flow_id}")))?;
        let rows = state
            .maps_of_flow(&flow.id)
            .flat_map(|m| m.mappings.iter().cloned())
            .collect();
        return Ok((flow.id.clone(), rows));
    }

    let map_id = hierarchy::resolve_map_id(state, scope.map.as_deref())?;
    let map = state
        .find_map(&map_id)
        .ok_or_else(|| AppError::NotFound(format!("Map {map_id}")))?;
    Ok((map.flow_id.clone(), map.mappings.clone()))
}

fn deliver_json<T: Serialize>(scope: &Scope, filename: &str, rows: usize, document: &T) -> Result<Value, AppError> {
    let text = serde_json::to_string_pretty(document)?;
    deliver(scope, filename, rows, serde_json::to_value(document)?, &text)
}

/// Write to `--out` when given, otherwise return the content inline.
fn deliver(scope: &Scope, filename: &str, rows: usize, content: Value, text: &str) -> Result<Value, AppError> {
    match scope.out.as_deref() {
        Some(out) => {
            let path = target_path(out, filename);
            std::fs::write(&path, text)?;
            tracing::info!(path = %path.display(), rows, "Export written");
            output(json!({ "filename": filename, "path": path, "rows": rows }))
        }
        None => output(json!({ "filename": filename, "rows": rows, "content": content })),
    }
}

pub(crate) fn target_path(out: &Path, filename: &str) -> PathBuf {
    if out.is_dir() {
        out.join(filename)
    } else {
        out.to_path_buf()
    }
}
