//! Configuration file handling
//!
//! Generic YAML loading and saving plus the default location for the muxd
//! config file. Loading is forgiving: a missing or unparseable file falls
//! back to defaults with a logged warning, so a bad edit never strands the
//! daemon at boot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns defaults.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => {
                log::info!("load_config: loaded {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("load_config: failed to parse config: {}, using defaults", e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: failed to read config file: {}, using defaults", e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("serializing config")?;
    std::fs::write(path, yaml).with_context(|| format!("writing config to {:?}", path))?;
    Ok(())
}

/// Default config file path
///
/// Returns: `$XDG_CONFIG_HOME/muxd/config.yaml` (or the platform
/// equivalent), falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("muxd")
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MuxConfig;

    #[test]
    fn test_default_path_ends_with_config_yaml() {
        let path = default_config_path();
        assert!(path.ends_with("muxd/config.yaml"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config: MuxConfig = load_config(Path::new("/nonexistent/muxd/config.yaml"));
        assert_eq!(config.num_channels, 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = MuxConfig::default().with_channels(4);
        save_config(&config, &path).unwrap();

        let back: MuxConfig = load_config(&path);
        assert_eq!(back.num_channels, 4);
    }

    #[test]
    fn test_invalid_yaml_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "num_channels: [not a number").unwrap();

        let config: MuxConfig = load_config(&path);
        assert_eq!(config.num_channels, 2);
    }
}
