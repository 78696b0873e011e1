//! `icd workspace …` and `icd theme …`.

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::export::target_path;
use crate::cli::{commit, output};
use crate::errors::AppError;
use crate::models::workspace::{Theme, WorkspaceState};
use crate::services::{export, hierarchy, workspace_io};
use crate::AppState;

#[derive(Debug, Subcommand)]
pub enum WorkspaceCommand {
    /// Summary of the saved workspace.
    Show,
    /// Export the whole workspace as JSON.
    Export {
        /// File or directory to write to; printed inline otherwise.
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Replace the workspace with an exported file.
    Import { file: PathBuf },
    /// Discard the saved workspace and start over.
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ThemeCommand {
    Show,
    Set {
        #[arg(value_enum)]
        theme: Theme,
    },
}

pub fn run(app: &mut AppState, command: WorkspaceCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    match command {
        WorkspaceCommand::Show => {
            let ws = &app.workspace;
            output(json!({
                "schemaVersion": ws.schema_version,
                "dataDir": app.store.files().dir(),
                "selection": hierarchy::Selection::of(ws),
                "catalogMeta": ws.catalog_meta,
                "fields": ws.fields_catalog.len(),
                "rows": ws.mapping_rows().count(),
                "packages": hierarchy::tree(ws),
            }))
        }
        WorkspaceCommand::Export { out } => {
            let theme = app.store.theme()?;
            let document = workspace_io::export_workspace(&app.workspace, theme, now);
            let filename = export::workspace_filename(now);
            match out {
                Some(out) => {
                    let path = target_path(&out, &filename);
                    std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;
                    tracing::info!(path = %path.display(), "Workspace exported");
                    output(json!({ "filename": filename, "path": path }))
                }
                None => output(json!({ "filename": filename, "content": document })),
            }
        }
        WorkspaceCommand::Import { file } => {
            let data = std::fs::read(&file)
                .map_err(|e| AppError::Import(format!("Cannot read {}: {e}", file.display())))?;
            let import = workspace_io::import_workspace(&app.workspace, &data, now)?;
            let summary = workspace_io::apply_import(&mut app.workspace, import);
            let theme = summary.theme;
            let data = commit(app, summary)?;
            if let Some(theme) = theme {
                app.store.set_theme(theme)?;
            }
            Ok(data)
        }
        WorkspaceCommand::Reset { yes } => {
            if !yes {
                return Err(AppError::ConfirmationRequired(
                    "Resetting discards every package, flow, map and catalog field; pass --yes".to_string(),
                ));
            }
            app.workspace = WorkspaceState::new(now);
            commit(app, hierarchy::Selection::of(&app.workspace))
        }
    }
}

pub fn run_theme(app: &mut AppState, command: ThemeCommand) -> Result<Value, AppError> {
    match command {
        ThemeCommand::Show => output(json!({ "theme": app.store.theme()? })),
        ThemeCommand::Set { theme } => {
            app.store.set_theme(theme)?;
            output(json!({ "theme": theme }))
        }
    }
}
