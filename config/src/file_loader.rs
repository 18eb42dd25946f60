//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files.
//!
//! Supports automatic format detection based on file extension.

use crate::config::FixtureConfig;
use errors::ConfigError;
use std::path::Path;

/// Load configuration from TOML file.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("fixtures.toml"))?;
///     println!("Terraform binary: {}", config.terraform.binary);
///     Ok(())
/// }
/// ```
pub fn load_from_toml(path: &Path) -> Result<FixtureConfig, ConfigError> {
    let contents = read(path)?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        format: "TOML".to_string(),
        reason: e.to_string()
    })
}

/// Load configuration from YAML file.
pub fn load_from_yaml(path: &Path) -> Result<FixtureConfig, ConfigError> {
    let contents = read(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        format: "YAML".to_string(),
        reason: e.to_string()
    })
}

/// Load configuration from file with auto-detection.
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml`: YAML format
/// - `.yml`: YAML format
pub fn load_from_file(path: &Path) -> Result<FixtureConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        _ => Err(ConfigError::UnsupportedFormat { extension })
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_e| ConfigError::FileNotFound {
        path: path.display().to_string()
    })
}
