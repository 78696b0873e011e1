//! `icd mapping …`: edit the rows of a map. Commands act on the active map
//! unless `--map` is given.

use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::{json, Value};

use crate::cli::{commit, output};
use crate::errors::AppError;
use crate::models::mapping::Side;
use crate::services::hierarchy;
use crate::services::mapping::{self, Annotations, Placement, SideFlags};
use crate::AppState;

#[derive(Debug, Args)]
pub struct MapArg {
    /// Map to edit (defaults to the active map).
    #[arg(long = "map")]
    pub map_id: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum MappingCommand {
    List {
        #[command(flatten)]
        map: MapArg,
    },
    /// Put a catalog field on a row side.
    Place {
        field_id: String,
        #[arg(long, value_enum)]
        side: Side,
        /// Existing row to fill.
        #[arg(long, conflicts_with = "new")]
        row: Option<String>,
        /// Always append a new row.
        #[arg(long)]
        new: bool,
        #[command(flatten)]
        map: MapArg,
    },
    /// One new row per field.
    BulkAdd {
        #[arg(required = true)]
        field_ids: Vec<String>,
        #[arg(long, value_enum)]
        side: Side,
        #[command(flatten)]
        map: MapArg,
    },
    /// Append an empty row.
    AddRow {
        #[command(flatten)]
        map: MapArg,
    },
    /// Move a placed field to another row or side.
    Move {
        #[arg(long)]
        from_row: String,
        #[arg(long, value_enum)]
        from_side: Side,
        #[arg(long)]
        to_row: String,
        #[arg(long, value_enum)]
        to_side: Side,
        #[command(flatten)]
        map: MapArg,
    },
    /// Move the row at position FROM to position TO (zero-based).
    Reorder {
        from: usize,
        to: usize,
        #[command(flatten)]
        map: MapArg,
    },
    /// Edit a side's per-mapping flags.
    Flags {
        row_id: String,
        #[arg(long, value_enum)]
        side: Side,
        #[arg(long)]
        required_by_system: Option<bool>,
        #[arg(long)]
        required_in_integration: Option<bool>,
        /// P0, P1, P2 or an empty string to unset.
        #[arg(long)]
        priority: Option<String>,
        #[command(flatten)]
        map: MapArg,
    },
    /// Edit a row's shared annotations.
    Annotate {
        row_id: String,
        #[arg(long)]
        human_name: Option<String>,
        #[arg(long)]
        transform_rule: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        map: MapArg,
    },
    Remove {
        row_id: String,
        #[command(flatten)]
        map: MapArg,
    },
    /// Report missing sides and attribute mismatches.
    Validate {
        #[command(flatten)]
        map: MapArg,
    },
    /// List the available transform rules.
    Rules,
}

pub fn run(app: &mut AppState, command: MappingCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    let ws = &mut app.workspace;
    let result = match command {
        MappingCommand::List { map } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            return output(mapping::list_rows(ws, &map_id)?);
        }
        MappingCommand::Validate { map } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            let rows = mapping::validate_map(ws, &map_id)?;
            let errors = rows.iter().filter(|r| r.severity == mapping::Severity::Error).count();
            let warnings = rows.iter().filter(|r| r.severity == mapping::Severity::Warning).count();
            return output(json!({
                "map_id": map_id,
                "errors": errors,
                "warnings": warnings,
                "rows": rows,
            }));
        }
        MappingCommand::Rules => return output(mapping::TRANSFORM_RULES),
        MappingCommand::Place {
            field_id,
            side,
            row,
            new,
            map,
        } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            let placement = match (row, new) {
                (Some(row_id), _) => Placement::Row(row_id),
                (None, true) => Placement::New,
                (None, false) => Placement::Auto,
            };
            serde_json::to_value(mapping::place_field(ws, &map_id, &field_id, side, placement, now)?)?
        }
        MappingCommand::BulkAdd { field_ids, side, map } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            serde_json::to_value(mapping::bulk_add(ws, &map_id, &field_ids, side, now)?)?
        }
        MappingCommand::AddRow { map } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            serde_json::to_value(mapping::add_row(ws, &map_id, now)?)?
        }
        MappingCommand::Move {
            from_row,
            from_side,
            to_row,
            to_side,
            map,
        } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            mapping::move_field(ws, &map_id, (&from_row, from_side), (&to_row, to_side), now)?;
            serde_json::to_value(mapping::list_rows(ws, &map_id)?)?
        }
        MappingCommand::Reorder { from, to, map } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            mapping::reorder(ws, &map_id, from, to, now)?;
            serde_json::to_value(mapping::list_rows(ws, &map_id)?)?
        }
        MappingCommand::Flags {
            row_id,
            side,
            required_by_system,
            required_in_integration,
            priority,
            map,
        } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            let flags = SideFlags {
                required_by_system,
                required_in_integration,
                priority_level: priority,
            };
            serde_json::to_value(mapping::set_side_flags(ws, &map_id, &row_id, side, flags, now)?)?
        }
        MappingCommand::Annotate {
            row_id,
            human_name,
            transform_rule,
            notes,
            status,
            map,
        } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            let annotations = Annotations {
                human_name,
                transform_rule,
                notes,
                status,
            };
            serde_json::to_value(mapping::annotate(ws, &map_id, &row_id, annotations, now)?)?
        }
        MappingCommand::Remove { row_id, map } => {
            let map_id = hierarchy::resolve_map_id(ws, map.map_id.as_deref())?;
            serde_json::to_value(mapping::remove_row(ws, &map_id, &row_id, now)?)?
        }
    };
    commit(app, result)
}
