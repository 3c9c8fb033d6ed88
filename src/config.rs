use std::{
    fs::File,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    LapLoggerError, storage::DEFAULT_FILENAME_FORMAT, telemetry::normalizer::DEFAULT_SECTOR_COUNT,
};

const APP_DIR_NAME: &str = "lap-logger";
const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub filename_format: String,
    pub poll_interval_ms: u64,
    pub sector_count: u32,
    /// JSON vehicle list used for car model, manufacturer, team and class
    pub vehicle_catalog: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            filename_format: DEFAULT_FILENAME_FORMAT.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sector_count: DEFAULT_SECTOR_COUNT,
            vehicle_catalog: None,
        }
    }
}

/// `<data dir>/lap-logger/laps`, or `./laps` when the platform has no data dir.
pub fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("laps"))
        .unwrap_or_else(|| PathBuf::from("laps"))
}

fn config_path() -> Result<PathBuf, LapLoggerError> {
    Ok(dirs::config_dir()
        .ok_or(LapLoggerError::NoConfigDir)?
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// Config saved in the user's config directory, `None` if there is none yet.
    pub fn from_local_file() -> Result<Option<Self>, LapLoggerError> {
        Self::load_from(&config_path()?)
    }

    pub fn save(&self) -> Result<(), LapLoggerError> {
        self.save_to(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, LapLoggerError> {
        if !path.exists() {
            return Ok(None);
        }
        debug!("Loading config from {:?}", path);
        let file = File::open(path).map_err(|e| LapLoggerError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| LapLoggerError::ConfigSerializeError { source: e })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), LapLoggerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LapLoggerError::ConfigIOError { source: e })?;
        }
        let file = File::create(path).map_err(|e| LapLoggerError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| LapLoggerError::ConfigSerializeError { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(AppConfig::load_from(&dir.path().join("config.json")).unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            output_dir: dir.path().join("laps"),
            poll_interval_ms: 50,
            vehicle_catalog: Some(PathBuf::from("vehicles.json")),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), Some(config));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sector_count": 4}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(config.sector_count, 4);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.filename_format, DEFAULT_FILENAME_FORMAT);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(LapLoggerError::ConfigSerializeError { .. })
        ));
    }
}
