//! Azure Service Bus test environment.

pub mod connection_string;
pub mod environment;

pub use connection_string::{
    ConnectionStringParser, ServiceBusConnectionProperties, ServiceBusConnectionStringParser
};
pub use environment::{
    CONNECTION_STRING_OUTPUT, EnvironmentState, LOCATION_VARIABLE, NAMESPACE_VARIABLE,
    ProvisionedNamespace, RESOURCE_GROUP_VARIABLE, SERVICE_BUS_MODULE, ServiceBusOptions,
    ServiceBusTestEnvironment, TeardownGuard
};
