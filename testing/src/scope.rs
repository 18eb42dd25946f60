//! Scoped use of a test environment.
//!
//! An environment is created before a group of test cases, lent to each of
//! them, and disposed afterwards:
//!
//! ```rust,no_run
//! use testing::{ServiceBusTestEnvironment, require_provisioned, scoped};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let environment = ServiceBusTestEnvironment::from_env()?;
//!     scoped(environment, |environment| {
//!         let namespace = require_provisioned!(environment);
//!         assert!(namespace.connection_string().starts_with("Endpoint="));
//!     })?;
//!     Ok(())
//! }
//! ```

use crate::servicebus::ServiceBusTestEnvironment;
use crate::terraform::ProvisioningTool;
use errors::FixtureError;

/// Something holding external resources that must be released explicitly.
pub trait Disposable {
    fn dispose(self) -> Result<(), FixtureError>;
}

impl<T: ProvisioningTool> Disposable for ServiceBusTestEnvironment<T> {
    fn dispose(self) -> Result<(), FixtureError> {
        ServiceBusTestEnvironment::dispose(self)
    }
}

/// Run `body` against `fixture`, then dispose it.
///
/// If `body` panics the fixture is dropped during unwinding, which still
/// releases it but can only log a teardown failure.
pub fn scoped<F, R>(fixture: F, body: impl FnOnce(&F) -> R) -> Result<R, FixtureError>
where
    F: Disposable
{
    let value = body(&fixture);
    fixture.dispose()?;
    Ok(value)
}

/// Evaluate to the provisioned namespace of an environment, or skip the
/// current test when the environment is disabled.
///
/// The one-argument form returns `Default::default()`; pass the value to
/// return explicitly for functions returning `Result`.
#[macro_export]
macro_rules! require_provisioned {
    ($environment:expr) => {
        $crate::require_provisioned!($environment, Default::default())
    };
    ($environment:expr, $skipped:expr) => {
        match $environment.provisioned() {
            Some(namespace) => namespace,
            None => {
                eprintln!(
                    "Skipping {}: Azure credentials unavailable",
                    module_path!()
                );
                return $skipped;
            }
        }
    };
}
