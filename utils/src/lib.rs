//! # Test Environment Utilities
//!
//! Naming helpers for ephemeral Azure resources and workspace path discovery.
//!
//! # Resource Name Rules
//!
//! - Resource groups: 1-90 characters of letters, digits, `.`, `_`, `-`,
//!   `(` and `)`; must not end with a period.
//! - Service Bus namespaces: 6-50 characters of letters, digits and hyphens;
//!   must start with a letter, end with a letter or digit, and must not end
//!   with `-sb` or `-mgmt`.
//!
//! See <https://docs.microsoft.com/en-us/azure/azure-resource-manager/management/resource-name-rules>

use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use uuid::Uuid;

/// Maximum length of an Azure resource group name.
pub const RESOURCE_GROUP_MAX_LEN: usize = 90;

/// Length of the random suffix appended to resource group names.
const GROUP_SUFFIX_LEN: usize = 8;

/// CI variables consulted, in order, for a run identifier.
const CI_RUN_ID_VARS: [&str; 3] = ["GITHUB_RUN_ID", "BUILD_ID", "BUILD_NUMBER"];

static RESOURCE_GROUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._()\-]{1,90}$").expect("resource group pattern is valid")
});

static NAMESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9\-]{4,48}[A-Za-z0-9]$").expect("namespace pattern is valid")
});

/// Generate UUID v4 string
#[must_use]
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Short random suffix (lowercase hex) for names with tight length limits.
#[must_use]
pub fn short_suffix() -> String {
    let mut simple = Uuid::new_v4().simple().to_string();
    simple.truncate(GROUP_SUFFIX_LEN);
    simple
}

/// Produces names for resources created by a test environment.
///
/// Implementations must be collision resistant across concurrent test runs.
pub trait NameGenerator {
    /// Resource group name derived from `base_label`.
    fn resource_group_name(&self, base_label: &str) -> String;

    /// Fresh globally unique suffix.
    fn unique_suffix(&self) -> String;

    /// Resource name made of `base_label` and a fresh unique suffix.
    fn resource_name(&self, base_label: &str) -> String {
        format!("{}-{}", base_label, self.unique_suffix())
    }
}

/// Default generator: resource groups carry the run identifier so that
/// leaked groups can be traced back to the CI run or developer that made them.
#[derive(Debug, Clone)]
pub struct DefaultNameGenerator {
    run_id: String
}

impl DefaultNameGenerator {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: sanitize_resource_group_name(&run_id.into())
        }
    }

    /// Generator using [`run_id_from_env`].
    pub fn from_env() -> Self {
        Self::new(run_id_from_env())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl NameGenerator for DefaultNameGenerator {
    fn resource_group_name(&self, base_label: &str) -> String {
        let suffix = short_suffix();
        // Leave room for "-<suffix>" so truncation never eats the unique part.
        let budget = RESOURCE_GROUP_MAX_LEN - GROUP_SUFFIX_LEN - 1;
        let mut head = sanitize_resource_group_name(&format!("{}-{}", self.run_id, base_label));
        head.truncate(budget);
        let head = head.trim_end_matches('.');
        format!("{}-{}", head, suffix)
    }

    fn unique_suffix(&self) -> String {
        generate_uuid()
    }
}

/// Identifier of the current run: `ci-<id>` on CI, otherwise the local user.
#[must_use]
pub fn run_id_from_env() -> String {
    for key in CI_RUN_ID_VARS {
        if let Ok(value) = env::var(key) {
            if !value.trim().is_empty() {
                return format!("ci-{}", value.trim());
            }
        }
    }

    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|user| !user.trim().is_empty())
        .map(|user| sanitize_resource_group_name(&user.to_lowercase()))
        .unwrap_or_else(|| "local".to_string())
}

/// Replace characters Azure rejects in resource group names with `-`.
#[must_use]
pub fn sanitize_resource_group_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '(' | ')') {
                c
            } else {
                '-'
            }
        })
        .collect();
    name.truncate(RESOURCE_GROUP_MAX_LEN);
    name.trim_end_matches('.').to_string()
}

/// Validate a resource group name
#[must_use]
pub fn is_valid_resource_group_name(name: &str) -> bool {
    RESOURCE_GROUP_PATTERN.is_match(name) && !name.ends_with('.')
}

/// Validate a Service Bus namespace name
#[must_use]
pub fn is_valid_servicebus_namespace(name: &str) -> bool {
    NAMESPACE_PATTERN.is_match(name) && !name.ends_with("-sb") && !name.ends_with("-mgmt")
}

/// First ancestor of `start` (inclusive) whose `Cargo.toml` declares a
/// `[workspace]`.
#[must_use]
pub fn workspace_root(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        let manifest = dir.join("Cargo.toml");
        let contents = std::fs::read_to_string(&manifest).ok()?;
        contents
            .lines()
            .any(|line| line.trim() == "[workspace]")
            .then(|| dir.to_path_buf())
    })
}
