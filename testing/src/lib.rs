//! Shared live-infrastructure test environments.
//!
//! Provisions an Azure Service Bus namespace with Terraform for a group of
//! integration tests and tears it down afterwards:
//! - [`azure`]: credential probing (service principal, `ARM_*`, `az login`)
//! - [`terraform`]: blocking Terraform CLI wrapper
//! - [`servicebus`]: connection string parsing and the environment itself
//! - [`scope`]: scoped acquisition with guaranteed release
//!
//! Without Azure credentials an environment is disabled rather than failed,
//! so suites run cleanly on machines that cannot reach Azure.

pub mod azure;
pub mod logging;
pub mod scope;
pub mod servicebus;
pub mod stubs;
pub mod terraform;

pub use azure::{AzureCredentials, CredentialProbe, EnvironmentCredentialProbe, ServicePrincipal};
pub use errors::{ConnectionStringError, FixtureError, ProvisioningStep, ToolError};
pub use logging::init_test_logging;
pub use scope::{Disposable, scoped};
pub use servicebus::{
    ConnectionStringParser, EnvironmentState, ProvisionedNamespace,
    ServiceBusConnectionProperties, ServiceBusConnectionStringParser, ServiceBusOptions,
    ServiceBusTestEnvironment
};
pub use terraform::{ProvisioningTool, TerraformResources, VariableSet};
pub use utils::{DefaultNameGenerator, NameGenerator};
