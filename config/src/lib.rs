//! # Configuration System
//!
//! Configuration for ephemeral cloud test environments.
//!
//! This crate provides:
//! - Configuration structures for Terraform, Azure, naming and logging
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (env > file > defaults)
//! - Configuration validation
//!
//! # Best Practices
//!
//! - Uses `validator` crate for input validation
//! - Never stores secrets; credentials are resolved by the credential probe

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;

pub use config::{AzureConfig, FixtureConfig, LoggingConfig, NamingConfig, TerraformConfig};
pub use file_loader::{load_from_file, load_from_toml, load_from_yaml};
pub use loader::{apply_env_overrides, load_from_env};
pub use precedence::load_config;
pub use validator::Validate;
