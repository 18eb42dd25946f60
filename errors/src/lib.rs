//! # Test Environment Errors
//!
//! Error taxonomy for ephemeral cloud test environments.
//!
//! Follows Microsoft Pragmatic Rust Guidelines:
//! - Uses `thiserror` for structured error definitions
//! - Named fields in every message
//! - Source errors are chained, never flattened into strings
//!
//! A missing set of cloud credentials is deliberately absent from this
//! module: it disables an environment, it does not fail it.

use std::fmt;
use thiserror::Error;

/// Provisioning tool (Terraform CLI) errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String
    },

    #[error("Output not found: {name}")]
    OutputNotFound { name: String },

    #[error("Output {name} is not valid JSON: {reason}")]
    MalformedOutput { name: String, reason: String },

    #[error("Invalid working directory: {path}")]
    InvalidWorkingDirectory { path: String },

    #[error("Invalid variable: {name} reason: {reason}")]
    InvalidVariable { name: String, reason: String }
}

/// Connection string parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("Connection string is empty")]
    Empty,

    #[error("Malformed token: {token}")]
    MalformedToken { token: String },

    #[error("Duplicate key: {key}")]
    DuplicateKey { key: String },

    #[error("Missing required key: {key}")]
    MissingKey { key: String },

    #[error("Invalid endpoint: {endpoint} reason: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Conflicting credentials: {reason}")]
    ConflictingCredentials { reason: String }
}

/// Credential material errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credentials file {path} unreadable: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Credentials malformed: {reason}")]
    Malformed { reason: String },

    #[error("Credentials missing field: {field}")]
    MissingField { field: String }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse {format}: {reason}")]
    Parse { format: String, reason: String },

    #[error("Unsupported config file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid environment variable {key}: {reason}")]
    InvalidEnv { key: String, reason: String },

    #[error("Validation failed: {reason}")]
    Validation { reason: String }
}

/// Provisioning lifecycle step that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    Setup,
    Init,
    Apply
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Init => "init",
            Self::Apply => "apply"
        };
        f.write_str(name)
    }
}

/// Test environment lifecycle errors
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Provisioning failed during {step}: {source}")]
    ProvisioningFailure {
        step: ProvisioningStep,
        #[source]
        source: ToolError
    },

    #[error("Provisioned output {name} unavailable: {source}")]
    OutputMissing {
        name: String,
        #[source]
        source: ToolError
    },

    #[error("Connection string could not be parsed: {source}")]
    ParseFailure {
        #[source]
        source: ConnectionStringError
    },

    #[error("Teardown failed, resources may have leaked: {source}")]
    TeardownFailure {
        #[source]
        source: ToolError
    },

    #[error("Configuration error: {source}")]
    Configuration {
        #[from]
        source: ConfigError
    }
}

impl FixtureError {
    /// True when live infrastructure may have been left behind.
    ///
    /// Construction never tears down after a failed step, so anything that
    /// fails from `apply` onwards leaves resources for the caller.
    #[must_use]
    pub fn may_leak_resources(&self) -> bool {
        matches!(
            self,
            Self::TeardownFailure { .. }
                | Self::OutputMissing { .. }
                | Self::ProvisioningFailure {
                    step: ProvisioningStep::Apply,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_provisioning_failure_message_names_step() {
        let err = FixtureError::ProvisioningFailure {
            step: ProvisioningStep::Apply,
            source: ToolError::CommandFailed {
                command: "terraform apply".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "quota exceeded".to_string()
            }
        };
        let message = err.to_string();
        assert!(message.contains("apply"));
        assert!(message.contains("quota exceeded"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_leak_classification() {
        let teardown = FixtureError::TeardownFailure {
            source: ToolError::OutputNotFound {
                name: "x".to_string()
            }
        };
        assert!(teardown.may_leak_resources());

        let init = FixtureError::ProvisioningFailure {
            step: ProvisioningStep::Init,
            source: ToolError::InvalidWorkingDirectory {
                path: "/nowhere".to_string()
            }
        };
        assert!(!init.may_leak_resources());

        let output = FixtureError::OutputMissing {
            name: "connection_string".to_string(),
            source: ToolError::OutputNotFound {
                name: "connection_string".to_string()
            }
        };
        assert!(output.may_leak_resources());

        let parse = FixtureError::ParseFailure {
            source: ConnectionStringError::Empty
        };
        assert!(!parse.may_leak_resources());
    }

    #[test]
    fn test_config_error_converts() {
        let err: FixtureError = ConfigError::UnsupportedFormat {
            extension: "ini".to_string()
        }
        .into();
        assert!(matches!(
            err,
            FixtureError::Configuration {
                source: ConfigError::UnsupportedFormat { .. }
            }
        ));
        assert!(err.to_string().contains("ini"));
        assert!(err.source().is_some());
    }
}
