//! Sync configuration, stored as YAML.
//!
//! # API pattern
//!
//! - `load_at(path)` returns [`SyncConfig::default`] when the file is absent
//!   and [`CoreError::Parse`] (with the path) when it is malformed.
//! - `save_at(path, config)` writes `<path>.tmp` then renames over `<path>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::ZoneId;

/// Tunables shared by the sync engine and the background sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Zone given to documents and record ids created through the sync
    /// client without an explicit zone.
    pub default_zone: ZoneId,
    /// Upper bound on resolver-driven retries within one save.
    pub max_conflict_rounds: u32,
    /// Maximum records collected by a paginated query; `0` means no limit.
    pub query_limit: usize,
    /// Seconds between background sweeps of deferred saves.
    pub sweep_interval_secs: u64,
    /// Directory for file-backed documents, if one is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_zone: ZoneId::default_zone(),
            max_conflict_rounds: 8,
            query_limit: 0,
            sweep_interval_secs: 300,
            document_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Load a config file, falling back to defaults when it does not exist.
pub fn load_at(path: &Path) -> Result<SyncConfig, CoreError> {
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save a config file atomically.
pub fn save_at(path: &Path, config: &SyncConfig) -> Result<(), CoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let config = load_at(&tmp.path().join("cloudseed.yaml")).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cloudseed.yaml");
        std::fs::write(&path, "default_zone: Journal\nsweep_interval_secs: 30\n").unwrap();

        let config = load_at(&path).unwrap();
        assert_eq!(config.default_zone, ZoneId::from("Journal"));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.max_conflict_rounds, 8);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = SyncConfig {
            sweep_interval_secs: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
