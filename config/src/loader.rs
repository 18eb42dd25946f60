//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `TERRAFORM_*` / `TF_*`: Terraform CLI settings
//! - `AZURE_*`: Azure placement and login settings
//! - `FIXTURE_*`: Naming and logging settings

use crate::config::FixtureConfig;
use errors::ConfigError;
use std::env;
use std::path::PathBuf;

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Builds a configuration from defaults overridden by whatever environment
/// variables are set.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Terraform binary: {}", config.terraform.binary);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Terraform
/// - `TERRAFORM_BINARY`: Terraform executable (default: "terraform")
/// - `TERRAFORM_MODULES_ROOT`: Directory holding the Terraform modules
/// - `TF_PLUGIN_CACHE_DIR`: Provider plugin cache directory
/// - `TF_LOG`: Terraform log level
///
/// ### Azure
/// - `AZURE_CREDENTIALS_FILE`: Path to an `--sdk-auth` credentials file
/// - `AZURE_LOCATION`: Region for provisioned resources
/// - `AZURE_ALLOW_CLI_LOGIN`: Use an `az login` session (true/false, default: true)
///
/// ### Fixture
/// - `FIXTURE_NAME_PREFIX`: Namespace name prefix (default: "rust")
/// - `FIXTURE_RESOURCE_GROUP_LABEL`: Resource group base label
/// - `FIXTURE_RUN_ID`: Run identifier embedded in resource group names
/// - `FIXTURE_LOG_LEVEL`: Default log filter (default: "info")
pub fn load_from_env() -> Result<FixtureConfig, ConfigError> {
    let mut config = FixtureConfig::default();
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Override fields of `config` with every environment variable that is set.
pub fn apply_env_overrides(config: &mut FixtureConfig) -> Result<(), ConfigError> {
    if let Some(binary) = env_string("TERRAFORM_BINARY") {
        config.terraform.binary = binary;
    }
    if let Some(root) = env_string("TERRAFORM_MODULES_ROOT") {
        config.terraform.modules_root = Some(PathBuf::from(root));
    }
    if let Some(cache) = env_string("TF_PLUGIN_CACHE_DIR") {
        config.terraform.plugin_cache_dir = Some(PathBuf::from(cache));
    }
    if let Some(level) = env_string("TF_LOG") {
        config.terraform.log_level = Some(level);
    }

    if let Some(path) = env_string("AZURE_CREDENTIALS_FILE") {
        config.azure.credentials_file = Some(PathBuf::from(path));
    }
    if let Some(location) = env_string("AZURE_LOCATION") {
        config.azure.location = Some(location);
    }
    if let Some(allow) = parse_env::<bool>("AZURE_ALLOW_CLI_LOGIN")? {
        config.azure.allow_cli_login = allow;
    }

    if let Some(prefix) = env_string("FIXTURE_NAME_PREFIX") {
        config.naming.namespace_prefix = prefix;
    }
    if let Some(label) = env_string("FIXTURE_RESOURCE_GROUP_LABEL") {
        config.naming.resource_group_label = label;
    }
    if let Some(run_id) = env_string("FIXTURE_RUN_ID") {
        config.naming.run_id = Some(run_id);
    }
    if let Some(level) = env_string("FIXTURE_LOG_LEVEL") {
        config.logging.level = level.to_lowercase();
    }

    Ok(())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnv {
                key: key.to_string(),
                reason: e.to_string()
            }),
        None => Ok(None)
    }
}
