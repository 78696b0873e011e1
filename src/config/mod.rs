use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub state_key: String,
    pub theme_key: String,
    pub max_state_mb: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("ICD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".icd")),
            state_key: env::var("ICD_STATE_KEY").unwrap_or_else(|_| "icd_state_v1".to_string()),
            theme_key: env::var("ICD_THEME_KEY").unwrap_or_else(|_| "icd_theme".to_string()),
            max_state_mb: env::var("ICD_MAX_STATE_MB")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4.0),
        }
    }

    /// Override the data directory (CLI `--data-dir`).
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn max_state_bytes(&self) -> u64 {
        (self.max_state_mb * 1024.0 * 1024.0) as u64
    }
}
