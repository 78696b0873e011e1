pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod parsers;
pub mod services;
pub mod store;

use chrono::Utc;

use crate::errors::AppError;
use crate::models::workspace::WorkspaceState;
use crate::store::StateStore;

/// Everything a command needs: configuration, storage and the loaded workspace.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: StateStore,
    pub workspace: WorkspaceState,
}

impl AppState {
    /// Open the store described by `config` and load the workspace.
    pub fn load(config: config::AppConfig) -> Result<Self, AppError> {
        let store = StateStore::from_config(&config);
        let workspace = store.load(Utc::now())?;
        Ok(Self {
            config,
            store,
            workspace,
        })
    }

    /// Persist the in-memory workspace.
    pub fn save(&self) -> Result<usize, AppError> {
        self.store.save(&self.workspace)
    }
}
