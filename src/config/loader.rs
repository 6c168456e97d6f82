use super::types::Settings;
use crate::core::errors::ReconError;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const LOCAL_CONFIG: &str = "./reconflow.json";
const SETTINGS_FILE: &str = "settings.json";

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist and parse; default locations are best-effort.
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<Settings> {
        if let Some(path) = custom_path {
            if !path.exists() {
                return Err(ReconError::config(format!("config file not found: {:?}", path)).into());
            }
            return Self::load_from_file(path)
                .with_context(|| format!("Failed to load config from custom path: {:?}", path));
        }

        for path in Self::default_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(settings) => {
                    tracing::info!("Loaded settings from: {:?}", path);
                    return Ok(settings);
                }
                Err(e) => {
                    tracing::warn!("Failed to load settings from {:?}: {:#}", path, e);
                }
            }
        }

        tracing::info!("No settings file found, using default settings");
        Ok(Settings::default())
    }

    fn load_from_file(path: &Path) -> Result<Settings> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| ReconError::config(format!("{:?}: {}", path, e)))?;

        settings.validate()?;
        Ok(settings)
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(path) = Self::user_settings_path() {
            paths.push(path);
        }
        paths
    }

    /// Platform settings file, the target of `--init-config` when no path is given.
    pub fn user_settings_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "reconflow", "reconflow").map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    pub fn save_to_file(settings: &Settings, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)
            .context("Failed to serialize settings to JSON")?;
        crate::utils::fs::atomic_write(path, content.as_bytes())
    }
}
