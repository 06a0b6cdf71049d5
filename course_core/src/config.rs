//! Configuration file support for ergsheet.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/ergsheet/config.toml`.

use crate::stats::DEFAULT_POWER_WINDOWS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub library: LibraryConfig,
}

/// Training-file format written by `export`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Absolute watts
    #[default]
    Erg,
    /// Percent of FTP
    Mrc,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Erg => "erg",
            ExportFormat::Mrc => "mrc",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "erg" => Ok(ExportFormat::Erg),
            "mrc" => Ok(ExportFormat::Mrc),
            other => Err(Error::Config(format!(
                "Unknown export format '{}', expected erg or mrc",
                other
            ))),
        }
    }
}

/// Export configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub format: ExportFormat,

    /// `VERSION` written in the course header
    #[serde(default = "default_file_version")]
    pub file_version: u32,

    /// `FTP` written in the course header
    #[serde(default = "default_header_ftp")]
    pub header_ftp: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: ExportFormat::default(),
            file_version: default_file_version(),
            header_ftp: default_header_ftp(),
        }
    }
}

/// Rider profile fallback, used when the workbook has no `config` sheet
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    pub ftp: Option<f64>,
}

/// Statistics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Best-effort windows in minutes
    #[serde(default = "default_power_windows")]
    pub power_windows: Vec<u32>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            power_windows: default_power_windows(),
        }
    }
}

/// Library write-back configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_sheet")]
    pub sheet: String,

    /// Constant tag stored with every library row
    #[serde(default = "default_library_tag")]
    pub tag: String,

    /// CSV sidecar written next to the workbook
    #[serde(default = "default_library_file")]
    pub file: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            sheet: default_library_sheet(),
            tag: default_library_tag(),
            file: default_library_file(),
        }
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_file_version() -> u32 {
    2
}

fn default_header_ftp() -> u32 {
    360
}

fn default_power_windows() -> Vec<u32> {
    DEFAULT_POWER_WINDOWS.to_vec()
}

fn default_library_sheet() -> String {
    "Library".into()
}

fn default_library_tag() -> String {
    "ERG".into()
}

fn default_library_file() -> String {
    "library.csv".into()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        match Self::default_config_path() {
            Some(config_path) if config_path.exists() => Self::load_from(&config_path),
            config_path => {
                tracing::info!("No config file found at {:?}, using defaults", config_path);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|base| base.join("ergsheet").join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if let Some(ftp) = self.profile.ftp {
            if ftp <= 0.0 {
                return Err(Error::Config(format!("profile.ftp must be positive, got {}", ftp)));
            }
        }
        if self.stats.power_windows.contains(&0) {
            return Err(Error::Config("stats.power_windows must be at least 1 minute".into()));
        }
        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.format, ExportFormat::Erg);
        assert_eq!(config.export.file_version, 2);
        assert_eq!(config.export.header_ftp, 360);
        assert_eq!(config.stats.power_windows, vec![1, 5, 20, 60]);
        assert_eq!(config.library.sheet, "Library");
        assert_eq!(config.profile.ftp, None);
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profile.ftp = Some(275.0);
        config.export.format = ExportFormat::Mrc;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.profile.ftp, Some(275.0));
        assert_eq!(loaded.export.format, ExportFormat::Mrc);
        assert_eq!(loaded.library.tag, config.library.tag);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[export]
format = "mrc"

[stats]
power_windows = [1, 10]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.export.format, ExportFormat::Mrc);
        assert_eq!(config.export.header_ftp, 360); // default
        assert_eq!(config.stats.power_windows, vec![1, 10]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[profile]\nftp = -5.0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("ERG".parse::<ExportFormat>().unwrap(), ExportFormat::Erg);
        assert_eq!("mrc".parse::<ExportFormat>().unwrap(), ExportFormat::Mrc);
        assert!("fit".parse::<ExportFormat>().is_err());
    }
}
