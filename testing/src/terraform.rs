//! # Terraform Resources
//!
//! Thin blocking wrapper over the Terraform CLI for one module directory.
//!
//! ## Commands
//! - `init -input=false -no-color`
//! - `apply -auto-approve -input=false -no-color -var k=v ...`
//! - `output -json -no-color <name>`
//! - `destroy -auto-approve -input=false -no-color -var k=v ...`
//!
//! Every line Terraform prints is forwarded to `tracing` under the
//! `terraform` target. No timeouts or retries are applied here; a hung
//! Terraform process blocks its caller.

use crate::azure::AzureCredentials;
use config::TerraformConfig;
use errors::ToolError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

/// Key/value parameters passed to Terraform as `-var` arguments.
///
/// Backed by an ordered map so the same set always renders the same argv.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSet(BTreeMap<String, String>);

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `-var name=value` pairs, validating each name.
    pub fn to_args(&self) -> Result<Vec<String>, ToolError> {
        let mut args = Vec::with_capacity(self.len() * 2);
        for (name, value) in self.iter() {
            validate_variable_name(name)?;
            args.push("-var".to_string());
            args.push(format!("{}={}", name, value));
        }
        Ok(args)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect()
        )
    }
}

fn validate_variable_name(name: &str) -> Result<(), ToolError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(ToolError::InvalidVariable {
            name: name.to_string(),
            reason: "must match [A-Za-z_][A-Za-z0-9_-]*".to_string()
        })
    }
}

/// Infrastructure-as-code executor driven through its lifecycle.
///
/// Every call blocks until the underlying tool finishes.
pub trait ProvisioningTool {
    fn init(&self) -> Result<(), ToolError>;
    fn apply(&self, variables: &VariableSet) -> Result<(), ToolError>;
    fn output(&self, name: &str) -> Result<String, ToolError>;
    fn destroy(&self, variables: &VariableSet) -> Result<(), ToolError>;
}

impl<T: ProvisioningTool + ?Sized> ProvisioningTool for Arc<T> {
    fn init(&self) -> Result<(), ToolError> {
        (**self).init()
    }

    fn apply(&self, variables: &VariableSet) -> Result<(), ToolError> {
        (**self).apply(variables)
    }

    fn output(&self, name: &str) -> Result<String, ToolError> {
        (**self).output(name)
    }

    fn destroy(&self, variables: &VariableSet) -> Result<(), ToolError> {
        (**self).destroy(variables)
    }
}

/// Terraform CLI bound to one module directory and one set of credentials.
pub struct TerraformResources {
    working_dir: PathBuf,
    binary: String,
    env: Vec<(String, String)>,
    span: tracing::Span
}

impl TerraformResources {
    /// Fails when `working_dir` is not an existing directory.
    pub fn new(
        working_dir: impl Into<PathBuf>,
        credentials: &AzureCredentials
    ) -> Result<Self, ToolError> {
        let working_dir = working_dir.into();
        if !working_dir.is_dir() {
            return Err(ToolError::InvalidWorkingDirectory {
                path: working_dir.display().to_string()
            });
        }

        let span = tracing::info_span!("terraform", module = %working_dir.display());
        Ok(Self {
            working_dir,
            binary: "terraform".to_string(),
            env: credentials.terraform_env(),
            span
        })
    }

    pub fn from_config(
        working_dir: impl Into<PathBuf>,
        credentials: &AzureCredentials,
        config: &TerraformConfig
    ) -> Result<Self, ToolError> {
        let mut terraform = Self::new(working_dir, credentials)?.with_binary(&config.binary);
        if let Some(level) = &config.log_level {
            terraform = terraform.with_env("TF_LOG", level);
        }
        if let Some(cache) = &config.plugin_cache_dir {
            terraform = terraform.with_env("TF_PLUGIN_CACHE_DIR", cache.display().to_string());
        }
        Ok(terraform)
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run one subcommand and return its stdout. Output lines are logged as
    /// Terraform prints them.
    fn run(&self, subcommand: &str, args: &[String]) -> Result<String, ToolError> {
        let _entered = self.span.enter();
        let command = format!("{} {}", self.binary, subcommand);
        tracing::info!("Running {}", command);

        let spawn_error = |e: std::io::Error| ToolError::Spawn {
            program: self.binary.clone(),
            reason: e.to_string()
        };

        let mut child = Command::new(&self.binary)
            .arg(subcommand)
            .args(args)
            .current_dir(&self.working_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // stderr drains on its own thread while stdout drains here.
        let stderr_pipe = child.stderr.take();
        let span = self.span.clone();
        let stderr_reader = thread::spawn(move || {
            let _entered = span.enter();
            stderr_pipe
                .map(|pipe| forward_lines(pipe, true))
                .unwrap_or_default()
        });
        let stdout = child
            .stdout
            .take()
            .map(|pipe| forward_lines(pipe, false))
            .unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let status = child.wait().map_err(spawn_error)?;

        if status.success() {
            Ok(stdout)
        } else {
            Err(ToolError::CommandFailed {
                command,
                status: status.to_string(),
                stderr: stderr.trim().to_string()
            })
        }
    }

    fn lifecycle_args(variables: &VariableSet) -> Result<Vec<String>, ToolError> {
        let mut args = vec![
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(variables.to_args()?);
        Ok(args)
    }
}

impl fmt::Debug for TerraformResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("TerraformResources")
            .field("working_dir", &self.working_dir)
            .field("binary", &self.binary)
            .field("env", &env_keys)
            .finish()
    }
}

impl ProvisioningTool for TerraformResources {
    fn init(&self) -> Result<(), ToolError> {
        self.run(
            "init",
            &["-input=false".to_string(), "-no-color".to_string()]
        )
        .map(|_| ())
    }

    fn apply(&self, variables: &VariableSet) -> Result<(), ToolError> {
        let args = Self::lifecycle_args(variables)?;
        self.run("apply", &args).map(|_| ())
    }

    fn output(&self, name: &str) -> Result<String, ToolError> {
        let args = ["-json".to_string(), "-no-color".to_string(), name.to_string()];
        let output = match self.run("output", &args) {
            Ok(output) => output,
            Err(ToolError::CommandFailed { stderr, .. }) if is_missing_output(&stderr, name) => {
                return Err(ToolError::OutputNotFound {
                    name: name.to_string()
                });
            }
            Err(e) => return Err(e)
        };

        let value: serde_json::Value =
            serde_json::from_str(&output).map_err(|e| ToolError::MalformedOutput {
                name: name.to_string(),
                reason: e.to_string()
            })?;

        match value {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Null => Err(ToolError::OutputNotFound {
                name: name.to_string()
            }),
            other => Ok(other.to_string())
        }
    }

    fn destroy(&self, variables: &VariableSet) -> Result<(), ToolError> {
        let args = Self::lifecycle_args(variables)?;
        self.run("destroy", &args).map(|_| ())
    }
}

/// Terraform's wording for an output absent from the state.
fn is_missing_output(stderr: &str, name: &str) -> bool {
    let stderr = stderr.to_lowercase();
    let named = format!("output \"{}\" not found", name.to_lowercase());
    stderr.contains(&named)
        || stderr.contains("could not be found in the state file")
        || stderr.contains("no outputs found")
}

/// Log each line of `pipe` as it arrives and return everything read.
fn forward_lines(pipe: impl Read, is_stderr: bool) -> String {
    let mut reader = BufReader::new(pipe);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&buf);
        captured.push_str(&line);

        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if is_stderr {
            tracing::warn!(target: "terraform", "{}", line);
        } else {
            tracing::debug!(target: "terraform", "{}", line);
        }
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_variable_set_renders_sorted_args() {
        let variables = VariableSet::new()
            .with("servicebus_namespace", "rust-1")
            .with("resource_group", "rg-1");
        assert_eq!(
            variables.to_args().unwrap(),
            vec![
                "-var",
                "resource_group=rg-1",
                "-var",
                "servicebus_namespace=rust-1"
            ]
        );
    }

    #[test]
    fn test_variable_set_insertion_order_irrelevant() {
        let a: VariableSet = [("a", "1"), ("b", "2")].into_iter().collect();
        let b: VariableSet = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.get("a"), Some("1"));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_invalid_variable_name_rejected() {
        let variables = VariableSet::new().with("bad name", "x");
        let err = variables.to_args().unwrap_err();
        assert!(matches!(err, ToolError::InvalidVariable { ref name, .. } if name == "bad name"));

        assert!(VariableSet::new().with("9lives", "x").to_args().is_err());
        assert!(VariableSet::new().with("_ok-name1", "x").to_args().is_ok());
    }

    #[test]
    fn test_missing_working_directory_rejected() {
        let err = TerraformResources::new(
            "/nonexistent/terraform/module",
            &AzureCredentials::Unauthenticated
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidWorkingDirectory { .. }));
    }

    #[test]
    fn test_debug_hides_credential_values() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = AzureCredentials::ServicePrincipal(
            crate::azure::ServicePrincipal::new("id", "very-secret", "sub", "tenant")
        );
        let terraform = TerraformResources::new(dir.path(), &credentials).unwrap();
        let debug = format!("{:?}", terraform);
        assert!(debug.contains("ARM_CLIENT_SECRET"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_missing_output_detection() {
        assert!(is_missing_output(
            "Error: Output \"connection_string\" not found",
            "connection_string"
        ));
        assert!(is_missing_output(
            "The output variable requested could not be found in the state file.",
            "connection_string"
        ));
        assert!(!is_missing_output("Error: Failed to load state", "connection_string"));
        assert!(!is_missing_output(
            "Error: Backend configuration changed: bucket not found",
            "connection_string"
        ));
        assert!(!is_missing_output(
            "Error: Output \"namespace\" not found",
            "connection_string"
        ));
    }

    #[test]
    fn test_forward_lines_captures_everything() {
        let captured = forward_lines("first\n\nsecond".as_bytes(), false);
        assert_eq!(captured, "first\n\nsecond");
    }

    #[test]
    #[serial]
    fn test_spawn_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let terraform = TerraformResources::new(dir.path(), &AzureCredentials::Unauthenticated)
            .unwrap()
            .with_binary("/nonexistent/bin/terraform");
        let err = terraform.init().unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
