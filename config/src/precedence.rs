//! # Configuration Precedence
//!
//! Combines configuration sources with precedence rules.
//!
//! # Precedence Order
//! 1. Environment variables (highest priority)
//! 2. Configuration file
//! 3. Default values (lowest priority)

use crate::config::FixtureConfig;
use crate::file_loader::load_from_file;
use crate::loader::apply_env_overrides;
use errors::ConfigError;
use std::path::Path;
use validator::Validate;

/// Load, merge and validate configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Starts from the file at `path` (or defaults when `None`), applies
/// environment overrides and validates the result.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_config;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config(Some(Path::new("fixtures.toml")))?;
///     println!("Namespace prefix: {}", config.naming.namespace_prefix);
///     Ok(())
/// }
/// ```
pub fn load_config(path: Option<&Path>) -> Result<FixtureConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let config = load_from_file(path)?;
            tracing::debug!("Loaded test environment configuration from {}", path.display());
            config
        }
        None => FixtureConfig::default()
    };

    let before_env = config.clone();
    apply_env_overrides(&mut config)?;
    log_changes(&before_env, &config, "env");

    config.validate().map_err(|e| ConfigError::Validation {
        reason: e.to_string()
    })?;

    Ok(config)
}

fn log_changes(base: &FixtureConfig, merged: &FixtureConfig, source_name: &str) {
    let mut changes = Vec::new();

    if base.terraform != merged.terraform {
        changes.push("terraform");
    }
    if base.azure != merged.azure {
        changes.push("azure");
    }
    if base.naming != merged.naming {
        changes.push("naming");
    }
    if base.logging != merged.logging {
        changes.push("logging");
    }

    if !changes.is_empty() {
        tracing::debug!(
            "Configuration sections overridden by {}: {}",
            source_name,
            changes.join(", ")
        );
    }
}
