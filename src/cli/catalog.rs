//! `icd catalog …`: import, list and edit catalog fields.

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use serde_json::Value;

use crate::cli::{commit, output};
use crate::errors::AppError;
use crate::models::catalog::ImportStrategy;
use crate::models::field::{CreateField, UpdateField};
use crate::models::pagination::Pagination;
use crate::parsers::InputFormat;
use crate::services::catalog::{self, CatalogFilter};
use crate::services::import;
use crate::AppState;

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Import a CSV, JSON or XLSX catalog file.
    Import {
        file: PathBuf,
        /// Override format detection from the file extension.
        #[arg(long, value_enum)]
        format: Option<InputFormat>,
        #[arg(long, value_enum, default_value_t = ImportStrategy::Replace)]
        strategy: ImportStrategy,
        /// Report what the import would do without applying it.
        #[arg(long)]
        preview: bool,
    },
    /// List catalog fields.
    List {
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        object: Option<String>,
        /// Only manually created fields.
        #[arg(long)]
        custom: bool,
        /// Case-insensitive search over system, object, field and description.
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        per_page: Option<usize>,
    },
    Show {
        field_id: String,
    },
    /// Create a custom field.
    Add {
        #[arg(long)]
        system: String,
        #[arg(long)]
        object: String,
        #[arg(long)]
        field: String,
        #[arg(long = "type")]
        data_type: Option<String>,
    },
    /// Edit a field; mapping sides using it are refreshed.
    Edit {
        field_id: String,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        object: Option<String>,
        #[arg(long)]
        field: Option<String>,
        #[arg(long = "type")]
        data_type: Option<String>,
        #[arg(long)]
        required: Option<bool>,
        #[arg(long)]
        key_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a field. Fields in use need --yes.
    Delete {
        field_id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Count the mapping rows using a field.
    Usage {
        field_id: String,
    },
}

pub fn run(app: &mut AppState, command: CatalogCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    match command {
        CatalogCommand::Import {
            file,
            format,
            strategy,
            preview,
        } => {
            let data = std::fs::read(&file)
                .map_err(|e| AppError::Import(format!("Cannot read {}: {e}", file.display())))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let prepared = import::prepare(&app.workspace, &filename, &data, format, now)?;
            if preview {
                return output(prepared.preview(&app.workspace));
            }
            let summary = import::apply(&mut app.workspace, prepared, strategy, now);
            commit(app, summary)
        }
        CatalogCommand::List {
            system,
            object,
            custom,
            query,
            page,
            per_page,
        } => {
            let filter = CatalogFilter {
                system,
                object,
                custom_only: custom,
                query,
            };
            output(catalog::list_fields(&app.workspace, &filter, &Pagination { page, per_page }))
        }
        CatalogCommand::Show { field_id } => output(catalog::get_field(&app.workspace, &field_id)?),
        CatalogCommand::Add {
            system,
            object,
            field,
            data_type,
        } => {
            let input = CreateField {
                system,
                object,
                field,
                data_type,
            };
            let created = catalog::create_custom_field(&mut app.workspace, input, now)?;
            commit(app, created)
        }
        CatalogCommand::Edit {
            field_id,
            system,
            object,
            field,
            data_type,
            required,
            key_type,
            description,
        } => {
            let update = UpdateField {
                system,
                object,
                field,
                data_type,
                required,
                key_type,
                description,
            };
            if update.is_empty() {
                return Err(AppError::Validation("Nothing to change".to_string()));
            }
            let updated = catalog::update_field(&mut app.workspace, &field_id, update, now)?;
            commit(app, updated)
        }
        CatalogCommand::Delete { field_id, yes } => {
            let deleted = catalog::delete_field(&mut app.workspace, &field_id, yes)?;
            commit(app, deleted)
        }
        CatalogCommand::Usage { field_id } => output(catalog::field_usage(&app.workspace, &field_id)?),
    }
}
