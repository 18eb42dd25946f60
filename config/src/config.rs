//! # Configuration Structures
//!
//! This module defines the configuration structures for ephemeral test
//! environments.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation
//! - Default every field so partial files are accepted

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Main configuration structure for test environments.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Aggregates everything a test environment needs to provision live
/// infrastructure: where Terraform lives, how Azure credentials are found,
/// how resources are named and how verbose logging is.
///
/// ## Usage
/// ```rust,no_run
/// use config::FixtureConfig;
///
/// let config = FixtureConfig::default();
/// assert_eq!(config.terraform.binary, "terraform");
/// ```
///
/// ## Validation
/// All nested configurations must pass their own validation rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct FixtureConfig {
    /// Terraform CLI settings
    #[serde(default)]
    #[validate(nested)]
    pub terraform: TerraformConfig,

    /// Azure credential and placement settings
    #[serde(default)]
    #[validate(nested)]
    pub azure: AzureConfig,

    /// Resource naming settings
    #[serde(default)]
    #[validate(nested)]
    pub naming: NamingConfig,

    /// Test logging settings
    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig
}

/// Terraform CLI configuration.
///
/// ## Fields
/// - `binary`: Terraform executable name or path (default: "terraform")
/// - `modules_root`: Directory holding one Terraform module per environment
///   (default: `<workspace>/build/terraform/azure`)
/// - `plugin_cache_dir`: Shared provider cache, exported as `TF_PLUGIN_CACHE_DIR`
/// - `log_level`: Terraform's own log level, exported as `TF_LOG`
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct TerraformConfig {
    #[serde(default = "default_terraform_binary")]
    #[validate(length(min = 1, max = 4096))]
    pub binary: String,

    #[serde(default)]
    pub modules_root: Option<PathBuf>,

    #[serde(default)]
    pub plugin_cache_dir: Option<PathBuf>,

    #[serde(default)]
    #[validate(custom(function = "validate_terraform_log_level"))]
    pub log_level: Option<String>
}

fn default_terraform_binary() -> String {
    "terraform".to_string()
}

fn validate_terraform_log_level(value: &str) -> Result<(), validator::ValidationError> {
    match value.to_ascii_uppercase().as_str() {
        "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR" | "JSON" | "OFF" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid Terraform log level"))
    }
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: default_terraform_binary(),
            modules_root: None,
            plugin_cache_dir: None,
            log_level: None
        }
    }
}

/// Azure configuration.
///
/// Secrets never live here: inline credentials are read straight from the
/// `AZURE_CREDENTIALS` environment variable by the credential probe.
///
/// ## Fields
/// - `credentials_file`: Path to an `--sdk-auth` style JSON credentials file
/// - `location`: Azure region passed to Terraform as `location` when set
/// - `allow_cli_login`: Fall back to an `az login` session (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct AzureConfig {
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub location: Option<String>,

    #[serde(default = "default_allow_cli_login")]
    pub allow_cli_login: bool
}

fn default_allow_cli_login() -> bool {
    true
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            location: None,
            allow_cli_login: default_allow_cli_login()
        }
    }
}

/// Resource naming configuration.
///
/// ## Fields
/// - `namespace_prefix`: Leading label of generated namespace names (default: "rust").
///   At most 13 characters so `<prefix>-<uuid>` fits the 50 character limit.
/// - `resource_group_label`: Base label of generated resource groups
///   (default: "service-bus-test")
/// - `run_id`: Overrides the CI/user derived run identifier
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct NamingConfig {
    #[serde(default = "default_namespace_prefix")]
    #[validate(
        length(min = 1, max = 13),
        custom(function = "validate_namespace_prefix")
    )]
    pub namespace_prefix: String,

    #[serde(default = "default_resource_group_label")]
    #[validate(length(min = 1, max = 60))]
    pub resource_group_label: String,

    #[serde(default)]
    #[validate(length(min = 1, max = 40))]
    pub run_id: Option<String>
}

fn default_namespace_prefix() -> String {
    "rust".to_string()
}

fn default_resource_group_label() -> String {
    "service-bus-test".to_string()
}

fn validate_namespace_prefix(value: &str) -> Result<(), validator::ValidationError> {
    let starts_with_letter = value.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let allowed = value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if starts_with_letter && allowed {
        Ok(())
    } else {
        Err(validator::ValidationError::new("Invalid namespace prefix"))
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
            resource_group_label: default_resource_group_label(),
            run_id: None
        }
    }
}

/// Logging configuration.
///
/// ## Fields
/// - `level`: Default filter when `RUST_LOG` is unset (default: "info")
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub level: String
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_logging_level()
        }
    }
}
