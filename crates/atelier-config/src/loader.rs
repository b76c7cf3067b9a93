use std::path::{Path, PathBuf};

use atelier_common::{Error, Result};
use tracing::info;

use crate::model::AppConfig;

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".atelier"));
        let xdg_config = dirs::config_dir().map(|c| c.join("atelier"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                // Prefer an existing XDG dir, fall back to an existing home
                // dir (legacy installs), default new installs to XDG.
                if xdg.exists() {
                    xdg
                } else if home.exists() {
                    home
                } else {
                    xdg
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".atelier"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns true if a config file (YAML or TOML) exists on disk.
    pub fn config_file_exists(&self) -> bool {
        self.config_dir.join("config.yml").exists() || self.config_dir.join("config.toml").exists()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Write a default `config.yml`. Refuses to clobber an existing file.
    pub fn write_default_config(&self) -> Result<PathBuf> {
        let path = self.config_dir.join("config.yml");
        if path.exists() {
            return Err(Error::Config(format!(
                "config already exists at {}",
                path.display()
            )));
        }

        let contents = serde_yaml::to_string(&AppConfig::default())
            .map_err(|e| Error::Config(format!("failed to serialize default config: {e}")))?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Resolve the database file path: explicit config wins, otherwise
    /// `<data_dir>/atelier.db` under the config directory.
    pub fn database_path(&self, config: &AppConfig) -> PathBuf {
        if let Some(path) = &config.database.path {
            return path.clone();
        }

        let data_dir = config
            .data_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("data"));
        data_dir.join("atelier.db")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [self.config_dir.clone(), self.config_dir.join("data")];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}
