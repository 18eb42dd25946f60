//! Ephemeral Service Bus namespace for a group of tests.
//!
//! Lifecycle: resolve credentials, provision with Terraform, expose the
//! connection string, destroy. Without credentials the environment is
//! [`EnvironmentState::Disabled`] and every step is skipped.
//!
//! A failed construction step is returned as-is and nothing is torn down;
//! the caller decides what to do about a half-provisioned namespace
//! ([`FixtureError::may_leak_resources`]). Once construction succeeds a
//! [`TeardownGuard`] owns the namespace. It is released by
//! [`ServiceBusTestEnvironment::dispose`], which reports teardown failures,
//! or on drop, which can only log them.

use super::connection_string::{
    ConnectionStringParser, ServiceBusConnectionProperties, ServiceBusConnectionStringParser
};
use crate::azure::{AzureCredentials, CredentialProbe};
use crate::terraform::{ProvisioningTool, TerraformResources, VariableSet};
use config::{FixtureConfig, Validate};
use errors::{ConfigError, ConnectionStringError, FixtureError, ProvisioningStep, ToolError};
use std::fmt;
use std::path::PathBuf;
use utils::{DefaultNameGenerator, NameGenerator};

pub const RESOURCE_GROUP_VARIABLE: &str = "resource_group";
pub const NAMESPACE_VARIABLE: &str = "servicebus_namespace";
pub const LOCATION_VARIABLE: &str = "location";
pub const CONNECTION_STRING_OUTPUT: &str = "connection_string";

/// Module directory under the Terraform modules root.
pub const SERVICE_BUS_MODULE: &str = "service_bus";

/// Naming and placement of the provisioned namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBusOptions {
    pub resource_group_label: String,
    pub namespace_prefix: String,
    pub location: Option<String>
}

impl Default for ServiceBusOptions {
    fn default() -> Self {
        Self {
            resource_group_label: "service-bus-test".to_string(),
            namespace_prefix: "rust".to_string(),
            location: None
        }
    }
}

impl From<&FixtureConfig> for ServiceBusOptions {
    fn from(config: &FixtureConfig) -> Self {
        Self {
            resource_group_label: config.naming.resource_group_label.clone(),
            namespace_prefix: config.naming.namespace_prefix.clone(),
            location: config.azure.location.clone()
        }
    }
}

/// Whether live infrastructure backs the environment.
#[derive(Debug)]
pub enum EnvironmentState {
    Disabled,
    Provisioned(ProvisionedNamespace)
}

/// A namespace that exists in Azure for the lifetime of the environment.
pub struct ProvisionedNamespace {
    resource_group: String,
    namespace: String,
    variables: VariableSet,
    connection_string: String,
    properties: Result<ServiceBusConnectionProperties, ConnectionStringError>
}

impl ProvisionedNamespace {
    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Variables used for both apply and destroy.
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Parsed connection string; fails if Terraform produced something
    /// unparseable, while [`Self::connection_string`] stays available.
    pub fn properties(&self) -> Result<&ServiceBusConnectionProperties, FixtureError> {
        self.properties
            .as_ref()
            .map_err(|source| FixtureError::ParseFailure {
                source: source.clone()
            })
    }
}

impl fmt::Debug for ProvisionedNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedNamespace")
            .field("resource_group", &self.resource_group)
            .field("namespace", &self.namespace)
            .field("connection_string", &"<redacted>")
            .field("properties", &self.properties)
            .finish()
    }
}

/// Destroys provisioned resources exactly once, on release or drop.
pub struct TeardownGuard<T: ProvisioningTool> {
    tool: T,
    variables: VariableSet,
    armed: bool
}

impl<T: ProvisioningTool> TeardownGuard<T> {
    fn new(tool: T, variables: VariableSet) -> Self {
        Self {
            tool,
            variables,
            armed: true
        }
    }

    /// Destroy now and report the outcome.
    pub fn release(mut self) -> Result<(), ToolError> {
        self.armed = false;
        self.tool.destroy(&self.variables)
    }
}

impl<T: ProvisioningTool> Drop for TeardownGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        tracing::warn!("Releasing Service Bus environment that was not disposed");
        if let Err(e) = self.tool.destroy(&self.variables) {
            tracing::error!(
                resource_group = self.variables.get(RESOURCE_GROUP_VARIABLE).unwrap_or_default(),
                "Teardown failed, resources may have leaked: {}",
                e
            );
        }
    }
}

/// Service Bus namespace provisioned for a group of tests.
pub struct ServiceBusTestEnvironment<T: ProvisioningTool = TerraformResources> {
    state: EnvironmentState,
    teardown: Option<TeardownGuard<T>>
}

impl<T: ProvisioningTool> ServiceBusTestEnvironment<T> {
    /// Environment with no live infrastructure behind it.
    pub fn disabled() -> Self {
        Self {
            state: EnvironmentState::Disabled,
            teardown: None
        }
    }

    /// Provision using the default Service Bus connection string parser.
    pub fn provision<P, N, F>(
        probe: &P,
        names: &N,
        options: &ServiceBusOptions,
        tool_factory: F
    ) -> Result<Self, FixtureError>
    where
        P: CredentialProbe + ?Sized,
        N: NameGenerator + ?Sized,
        F: FnOnce(&AzureCredentials) -> Result<T, ToolError>
    {
        Self::provision_with(
            probe,
            names,
            &ServiceBusConnectionStringParser,
            options,
            tool_factory
        )
    }

    /// Resolve credentials and, when authenticated, provision a namespace.
    ///
    /// `tool_factory` runs only after credentials resolve, so an
    /// unauthenticated run never constructs a tool.
    pub fn provision_with<P, N, C, F>(
        probe: &P,
        names: &N,
        parser: &C,
        options: &ServiceBusOptions,
        tool_factory: F
    ) -> Result<Self, FixtureError>
    where
        P: CredentialProbe + ?Sized,
        N: NameGenerator + ?Sized,
        C: ConnectionStringParser + ?Sized,
        F: FnOnce(&AzureCredentials) -> Result<T, ToolError>
    {
        let credentials = probe.resolve();
        if !credentials.is_authenticated() {
            tracing::info!("Azure credentials unavailable, Service Bus environment disabled");
            return Ok(Self::disabled());
        }

        let resource_group = names.resource_group_name(&options.resource_group_label);
        let namespace = names.resource_name(&options.namespace_prefix);
        let mut variables = VariableSet::new()
            .with(RESOURCE_GROUP_VARIABLE, resource_group.clone())
            .with(NAMESPACE_VARIABLE, namespace.clone());
        if let Some(location) = &options.location {
            variables.insert(LOCATION_VARIABLE, location.clone());
        }

        let tool = tool_factory(&credentials).map_err(|source| FixtureError::ProvisioningFailure {
            step: ProvisioningStep::Setup,
            source
        })?;

        tracing::info!(
            resource_group = %resource_group,
            namespace = %namespace,
            "Provisioning Service Bus namespace"
        );

        tool.init()
            .map_err(|source| FixtureError::ProvisioningFailure {
                step: ProvisioningStep::Init,
                source
            })?;
        tool.apply(&variables)
            .map_err(|source| FixtureError::ProvisioningFailure {
                step: ProvisioningStep::Apply,
                source
            })?;

        let connection_string = tool
            .output(CONNECTION_STRING_OUTPUT)
            .map_err(|source| FixtureError::OutputMissing {
                name: CONNECTION_STRING_OUTPUT.to_string(),
                source
            })?;
        let teardown = TeardownGuard::new(tool, variables.clone());

        let properties = parser.parse(&connection_string);
        if let Err(e) = &properties {
            tracing::error!("Provisioned connection string could not be parsed: {}", e);
        }

        tracing::info!(namespace = %namespace, "Service Bus namespace ready");

        Ok(Self {
            state: EnvironmentState::Provisioned(ProvisionedNamespace {
                resource_group,
                namespace,
                variables,
                connection_string,
                properties
            }),
            teardown: Some(teardown)
        })
    }

    pub fn state(&self) -> &EnvironmentState {
        &self.state
    }

    pub fn is_provisioned(&self) -> bool {
        matches!(self.state, EnvironmentState::Provisioned(_))
    }

    pub fn provisioned(&self) -> Option<&ProvisionedNamespace> {
        match &self.state {
            EnvironmentState::Provisioned(namespace) => Some(namespace),
            EnvironmentState::Disabled => None
        }
    }

    /// Raw connection string, `None` when disabled.
    pub fn connection_string(&self) -> Option<&str> {
        self.provisioned().map(ProvisionedNamespace::connection_string)
    }

    /// Parsed connection string, `Ok(None)` when disabled.
    pub fn connection_properties(
        &self
    ) -> Result<Option<&ServiceBusConnectionProperties>, FixtureError> {
        self.provisioned()
            .map(ProvisionedNamespace::properties)
            .transpose()
    }

    /// Destroy the namespace, surfacing teardown failures.
    pub fn dispose(self) -> Result<(), FixtureError> {
        let Self { state, teardown } = self;
        let Some(teardown) = teardown else {
            return Ok(());
        };

        if let EnvironmentState::Provisioned(namespace) = &state {
            tracing::info!(
                resource_group = %namespace.resource_group,
                namespace = %namespace.namespace,
                "Destroying Service Bus namespace"
            );
        }

        teardown
            .release()
            .map_err(|source| FixtureError::TeardownFailure { source })
    }
}

impl<T: ProvisioningTool> fmt::Debug for ServiceBusTestEnvironment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusTestEnvironment")
            .field("state", &self.state)
            .field("armed", &self.teardown.is_some())
            .finish()
    }
}

impl ServiceBusTestEnvironment<TerraformResources> {
    /// Provision from configuration: process-wide credentials, the default
    /// name generator and the `service_bus` Terraform module.
    ///
    /// The configuration is validated before credentials are probed.
    pub fn from_config(config: &FixtureConfig) -> Result<Self, FixtureError> {
        config
            .validate()
            .map_err(|e| ConfigError::Validation {
                reason: e.to_string()
            })?;
        crate::logging::init_test_logging(&config.logging.level);

        let credentials = AzureCredentials::instance_with(&config.azure);
        let names = match &config.naming.run_id {
            Some(run_id) => DefaultNameGenerator::new(run_id.clone()),
            None => DefaultNameGenerator::from_env()
        };
        let options = ServiceBusOptions::from(config);
        let module_dir = modules_root(config).map(|root| root.join(SERVICE_BUS_MODULE));

        Self::provision(credentials, &names, &options, |credentials| {
            let module_dir = module_dir.ok_or_else(|| ToolError::InvalidWorkingDirectory {
                path: format!("<workspace>/build/terraform/azure/{}", SERVICE_BUS_MODULE)
            })?;
            TerraformResources::from_config(module_dir, credentials, &config.terraform)
        })
    }

    /// Provision from configuration loaded from the environment.
    pub fn from_env() -> Result<Self, FixtureError> {
        let config = config::load_config(None)?;
        Self::from_config(&config)
    }
}

fn modules_root(config: &FixtureConfig) -> Option<PathBuf> {
    if let Some(root) = &config.terraform.modules_root {
        return Some(root.clone());
    }
    let start = std::env::current_dir().ok()?;
    utils::workspace_root(&start).map(|root| root.join("build").join("terraform").join("azure"))
}
