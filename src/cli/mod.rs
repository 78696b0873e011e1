//! Command-line front end: one subcommand group per workspace area.
//!
//! Handlers mutate [`AppState::workspace`] and save it before returning the
//! command's result as JSON.

pub mod catalog;
pub mod export;
pub mod hierarchy;
pub mod mapping;
pub mod workspace;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Parser)]
#[command(name = "icd", version, about = "Integration control document builder")]
pub struct Cli {
    /// Directory holding the saved workspace.
    #[arg(long, global = true, env = "ICD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Pretty-print the result envelope.
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import and edit the field catalog.
    #[command(subcommand)]
    Catalog(catalog::CatalogCommand),
    /// Manage packages.
    #[command(subcommand)]
    Package(hierarchy::PackageCommand),
    /// Manage sequences within packages.
    #[command(subcommand)]
    Sequence(hierarchy::SequenceCommand),
    /// Manage flows.
    #[command(subcommand)]
    Flow(hierarchy::FlowCommand),
    /// Manage maps within flows.
    #[command(subcommand)]
    Map(hierarchy::MapCommand),
    /// Edit mapping rows.
    #[command(subcommand)]
    Mapping(mapping::MappingCommand),
    /// Export mappings as CSV or JSON.
    #[command(subcommand)]
    Export(export::ExportCommand),
    /// Export, import or reset the whole workspace.
    #[command(subcommand)]
    Workspace(workspace::WorkspaceCommand),
    /// Show or change the theme.
    #[command(subcommand)]
    Theme(workspace::ThemeCommand),
}

/// Run one command against the loaded workspace.
pub fn dispatch(app: &mut AppState, command: Command) -> Result<Value, AppError> {
    match command {
        Command::Catalog(cmd) => catalog::run(app, cmd),
        Command::Package(cmd) => hierarchy::run_package(app, cmd),
        Command::Sequence(cmd) => hierarchy::run_sequence(app, cmd),
        Command::Flow(cmd) => hierarchy::run_flow(app, cmd),
        Command::Map(cmd) => hierarchy::run_map(app, cmd),
        Command::Mapping(cmd) => mapping::run(app, cmd),
        Command::Export(cmd) => export::run(app, cmd),
        Command::Workspace(cmd) => workspace::run(app, cmd),
        Command::Theme(cmd) => workspace::run_theme(app, cmd),
    }
}

/// Serialize a read-only result.
pub(crate) fn output<T: Serialize>(value: T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(value)?)
}

/// Save the workspace, then serialize the result.
pub(crate) fn commit<T: Serialize>(app: &AppState, value: T) -> Result<Value, AppError> {
    app.save()?;
    output(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["icd", "--data-dir", "/tmp/ws", "flow", "rename", "flow_01", "Styles"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ws")));
        assert!(matches!(
            cli.command,
            Command::Flow(hierarchy::FlowCommand::Rename { ref flow_id, ref name }) if flow_id == "flow_01" && name == "Styles"
        ));
    }

    #[test]
    fn unknown_group_is_rejected() {
        assert!(Cli::try_parse_from(["icd", "findings", "list"]).is_err());
    }
}
