//! `icd package|sequence|flow|map …`: hierarchy management and selection.

use chrono::Utc;
use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::{commit, output};
use crate::errors::AppError;
use crate::models::hierarchy::{MapStatus, SequenceStatus, SequenceTrigger};
use crate::services::hierarchy::{self, FlowUpdate, SequenceUpdate};
use crate::AppState;

#[derive(Debug, Subcommand)]
pub enum PackageCommand {
    /// Show the full package tree.
    List,
    Add,
    Rename { package_id: String, name: String },
    /// Collapse or expand a package in the tree.
    Toggle { package_id: String },
    Delete { package_id: String },
}

#[derive(Debug, Subcommand)]
pub enum SequenceCommand {
    Add {
        package_id: String,
        #[arg(long)]
        name: Option<String>,
    },
    Rename { sequence_id: String, name: String },
    /// Set trigger, status, SLA or owner.
    Configure {
        sequence_id: String,
        #[arg(long, value_enum)]
        trigger: Option<SequenceTrigger>,
        #[arg(long, value_enum)]
        status: Option<SequenceStatus>,
        #[arg(long)]
        sla_frequency: Option<String>,
        #[arg(long)]
        sla_timeout: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    Delete { sequence_id: String },
    Select { sequence_id: String },
}

#[derive(Debug, Subcommand)]
pub enum FlowCommand {
    Add {
        #[arg(long)]
        package: Option<String>,
        #[arg(long)]
        sequence: Option<String>,
    },
    /// Copy a flow with its maps and rows.
    Duplicate { flow_id: String },
    Rename { flow_id: String, name: String },
    /// Set source/target systems or move to another package.
    Configure {
        flow_id: String,
        #[arg(long)]
        source_system: Option<String>,
        #[arg(long)]
        target_system: Option<String>,
        #[arg(long)]
        package: Option<String>,
    },
    Delete { flow_id: String },
    /// Make a flow active; its first map becomes the active map.
    Select { flow_id: String },
}

#[derive(Debug, Subcommand)]
pub enum MapCommand {
    Add { flow_id: String },
    Rename { map_id: String, name: String },
    Status {
        map_id: String,
        #[arg(value_enum)]
        status: MapStatus,
    },
    Delete { map_id: String },
    Select { map_id: String },
}

pub fn run_package(app: &mut AppState, command: PackageCommand) -> Result<Value, AppError> {
    let ws = &mut app.workspace;
    match command {
        PackageCommand::List => output(json!({
            "packages": hierarchy::tree(ws),
            "selection": hierarchy::Selection::of(ws),
        })),
        PackageCommand::Add => {
            let package = hierarchy::add_package(ws)?;
            commit(app, package)
        }
        PackageCommand::Rename { package_id, name } => {
            let package = hierarchy::rename_package(ws, &package_id, &name)?;
            commit(app, package)
        }
        PackageCommand::Toggle { package_id } => {
            let package = hierarchy::toggle_package(ws, &package_id)?;
            commit(app, package)
        }
        PackageCommand::Delete { package_id } => {
            let package = hierarchy::delete_package(ws, &package_id)?;
            commit(app, package)
        }
    }
}

pub fn run_sequence(app: &mut AppState, command: SequenceCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    let ws = &mut app.workspace;
    let result = match command {
        SequenceCommand::Add { package_id, name } => {
            serde_json::to_value(hierarchy::add_sequence(ws, &package_id, name.as_deref(), now)?)?
        }
        SequenceCommand::Rename { sequence_id, name } => {
            serde_json::to_value(hierarchy::rename_sequence(ws, &sequence_id, &name, now)?)?
        }
        SequenceCommand::Configure {
            sequence_id,
            trigger,
            status,
            sla_frequency,
            sla_timeout,
            owner,
        } => {
            let update = SequenceUpdate {
                trigger,
                status,
                sla_frequency,
                sla_timeout,
                owner,
            };
            serde_json::to_value(hierarchy::configure_sequence(ws, &sequence_id, update, now)?)?
        }
        SequenceCommand::Delete { sequence_id } => serde_json::to_value(hierarchy::delete_sequence(ws, &sequence_id)?)?,
        SequenceCommand::Select { sequence_id } => serde_json::to_value(hierarchy::select_sequence(ws, &sequence_id)?)?,
    };
    commit(app, result)
}

pub fn run_flow(app: &mut AppState, command: FlowCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    let ws = &mut app.workspace;
    let result = match command {
        FlowCommand::Add { package, sequence } => {
            serde_json::to_value(hierarchy::add_flow(ws, package.as_deref(), sequence.as_deref(), now)?)?
        }
        FlowCommand::Duplicate { flow_id } => serde_json::to_value(hierarchy::duplicate_flow(ws, &flow_id, now)?)?,
        FlowCommand::Rename { flow_id, name } => serde_json::to_value(hierarchy::rename_flow(ws, &flow_id, &name)?)?,
        FlowCommand::Configure {
            flow_id,
            source_system,
            target_system,
            package,
        } => {
            let update = FlowUpdate {
                source_system,
                target_system,
                package_id: package,
            };
            serde_json::to_value(hierarchy::configure_flow(ws, &flow_id, update, now)?)?
        }
        FlowCommand::Delete { flow_id } => serde_json::to_value(hierarchy::delete_flow(ws, &flow_id)?)?,
        FlowCommand::Select { flow_id } => serde_json::to_value(hierarchy::select_flow(ws, &flow_id)?)?,
    };
    commit(app, result)
}

pub fn run_map(app: &mut AppState, command: MapCommand) -> Result<Value, AppError> {
    let now = Utc::now();
    let ws = &mut app.workspace;
    let result = match command {
        MapCommand::Add { flow_id } => serde_json::to_value(hierarchy::add_map(ws, &flow_id, now)?)?,
        MapCommand::Rename { map_id, name } => serde_json::to_value(hierarchy::rename_map(ws, &map_id, &name, now)?)?,
        MapCommand::Status { map_id, status } => {
            serde_json::to_value(hierarchy::set_map_status(ws, &map_id, status, now)?)?
        }
        MapCommand::Delete { map_id } => serde_json::to_value(hierarchy::delete_map(ws, &map_id)?)?,
        MapCommand::Select { map_id } => serde_json::to_value(hierarchy::select_map(ws, &map_id)?)?,
    };
    commit(app, result)
}
