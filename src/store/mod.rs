//! File-backed key-value store for the workspace blob and theme.
//!
//! Each key is one JSON file under the data directory. Writes go to a
//! hidden temp file that is renamed over the key file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::workspace::{Theme, WorkspaceState};
use crate::services::{hierarchy, migration};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, AppError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(AppError::Validation(format!("Invalid storage key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Raw value for `key`, or `None` if it was never written.
    pub fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match fs::read_to_string(self.path(key)?) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `value` under `key`. Values over the quota are rejected and the
    /// previous file is left untouched.
    pub fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let path = self.path(key)?;
        let size = value.len() as u64;
        if size > self.max_bytes {
            let err = AppError::StorageQuota {
                size_mb: size as f64 / BYTES_PER_MB,
                limit_mb: self.max_bytes as f64 / BYTES_PER_MB,
            };
            tracing::warn!(key, size, limit = self.max_bytes, "State exceeds storage quota");
            return Err(err);
        }

        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(key, size, "Stored value");
        Ok(())
    }
}

/// Workspace persistence on top of [`FileStore`].
#[derive(Debug, Clone)]
pub struct StateStore {
    files: FileStore,
    state_key: String,
    theme_key: String,
}

impl StateStore {
    pub fn new(files: FileStore, state_key: impl Into<String>, theme_key: impl Into<String>) -> Self {
        Self {
            files,
            state_key: state_key.into(),
            theme_key: theme_key.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            FileStore::new(&config.data_dir, config.max_state_bytes()),
            &config.state_key,
            &config.theme_key,
        )
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Load the workspace, migrating older blobs. A missing blob yields a
    /// fresh workspace.
    pub fn load(&self, now: DateTime<Utc>) -> Result<WorkspaceState, AppError> {
        let Some(raw) = self.files.get(&self.state_key)? else {
            tracing::info!(key = %self.state_key, "No saved workspace, starting fresh");
            return Ok(WorkspaceState::new(now));
        };

        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| AppError::Import(format!("Saved workspace is corrupt: {e}")))?;
        let migrated = migration::migrate_at(value, now)?;
        let mut state: WorkspaceState = serde_json::from_value(migrated)
            .map_err(|e| AppError::Import(format!("Saved workspace is invalid: {e}")))?;
        hierarchy::ensure_minimum(&mut state, now);
        Ok(state)
    }

    /// Persist the workspace. Returns the stored size in bytes.
    pub fn save(&self, state: &WorkspaceState) -> Result<usize, AppError> {
        let raw = serde_json::to_string(state)?;
        self.files.set(&self.state_key, &raw)?;
        tracing::info!(
            key = %self.state_key,
            bytes = raw.len(),
            fields = state.fields_catalog.len(),
            maps = state.maps.len(),
            "Workspace saved"
        );
        Ok(raw.len())
    }

    pub fn theme(&self) -> Result<Theme, AppError> {
        let Some(raw) = self.files.get(&self.theme_key)? else {
            return Ok(Theme::default());
        };
        match serde_json::from_str(&raw) {
            Ok(theme) => Ok(theme),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable theme, using default");
                Ok(Theme::default())
            }
        }
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), AppError> {
        self.files.set(&self.theme_key, &serde_json::to_string(&theme)?)
    }
}
