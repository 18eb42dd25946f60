//! # Azure Credentials
//!
//! Resolves whether the current process can reach Azure, and with what.
//!
//! ## Resolution Order
//! 1. The configured credentials file (`AZURE_CREDENTIALS_FILE`)
//! 2. `AZURE_CREDENTIALS`: inline JSON or a path to a JSON file in the
//!    `az ad sp create-for-rbac --sdk-auth` shape
//! 3. `ARM_CLIENT_ID`, `ARM_CLIENT_SECRET`, `ARM_SUBSCRIPTION_ID` and
//!    `ARM_TENANT_ID`, all set
//! 4. An `az login` session reported by `az account show`
//!
//! Anything else resolves to [`AzureCredentials::Unauthenticated`], which
//! disables live environments instead of failing them.

use config::AzureConfig;
use errors::CredentialError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use zeroize::Zeroizing;

const ARM_CLIENT_ID: &str = "ARM_CLIENT_ID";
const ARM_CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";
const ARM_SUBSCRIPTION_ID: &str = "ARM_SUBSCRIPTION_ID";
const ARM_TENANT_ID: &str = "ARM_TENANT_ID";

static CREDENTIALS: OnceLock<AzureCredentials> = OnceLock::new();

/// Something able to tell whether Azure credentials are available.
pub trait CredentialProbe {
    fn resolve(&self) -> AzureCredentials;
}

/// Service principal secret material.
#[derive(Clone)]
pub struct ServicePrincipal {
    pub client_id: String,
    client_secret: Zeroizing<String>,
    pub subscription_id: String,
    pub tenant_id: String
}

impl ServicePrincipal {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        subscription_id: impl Into<String>,
        tenant_id: impl Into<String>
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
            subscription_id: subscription_id.into(),
            tenant_id: tenant_id.into()
        }
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Outcome of probing for Azure credentials.
#[derive(Debug, Clone)]
pub enum AzureCredentials {
    ServicePrincipal(ServicePrincipal),
    AzureCli { subscription_id: Option<String> },
    Unauthenticated
}

impl AzureCredentials {
    /// Process-wide credentials, resolved on first use from the environment.
    pub fn instance() -> &'static AzureCredentials {
        CREDENTIALS.get_or_init(|| {
            let azure = config::load_from_env()
                .map(|config| config.azure)
                .unwrap_or_default();
            EnvironmentCredentialProbe::new(azure).resolve()
        })
    }

    /// Process-wide credentials; `azure` only applies if nothing resolved them yet.
    pub fn instance_with(azure: &AzureConfig) -> &'static AzureCredentials {
        CREDENTIALS.get_or_init(|| EnvironmentCredentialProbe::new(azure.clone()).resolve())
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }

    /// `ARM_*` variables understood by Terraform's azurerm provider.
    pub fn terraform_env(&self) -> Vec<(String, String)> {
        match self {
            Self::ServicePrincipal(principal) => vec![
                (ARM_CLIENT_ID.to_string(), principal.client_id.clone()),
                (
                    ARM_CLIENT_SECRET.to_string(),
                    principal.client_secret().to_string()
                ),
                (
                    ARM_SUBSCRIPTION_ID.to_string(),
                    principal.subscription_id.clone()
                ),
                (ARM_TENANT_ID.to_string(), principal.tenant_id.clone()),
            ],
            Self::AzureCli { subscription_id } => {
                let mut env = vec![("ARM_USE_CLI".to_string(), "true".to_string())];
                if let Some(id) = subscription_id {
                    env.push((ARM_SUBSCRIPTION_ID.to_string(), id.clone()));
                }
                env
            }
            Self::Unauthenticated => Vec::new()
        }
    }
}

/// An already resolved value is its own probe.
impl CredentialProbe for AzureCredentials {
    fn resolve(&self) -> AzureCredentials {
        self.clone()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SdkAuth {
    client_id: Option<String>,
    client_secret: Option<String>,
    subscription_id: Option<String>,
    tenant_id: Option<String>
}

#[derive(Deserialize)]
struct AccountShow {
    id: Option<String>
}

/// Probe backed by the process environment, credential files and the Azure CLI.
#[derive(Debug, Clone)]
pub struct EnvironmentCredentialProbe {
    config: AzureConfig,
    az_binary: String
}

impl EnvironmentCredentialProbe {
    pub fn new(config: AzureConfig) -> Self {
        Self {
            config,
            az_binary: "az".to_string()
        }
    }

    pub fn with_az_binary(mut self, binary: impl Into<String>) -> Self {
        self.az_binary = binary.into();
        self
    }

    fn principal_from_files(&self) -> Result<Option<ServicePrincipal>, CredentialError> {
        if let Some(path) = &self.config.credentials_file {
            return read_sdk_auth_file(path).map(Some);
        }

        match std::env::var("AZURE_CREDENTIALS") {
            Ok(value) if value.trim_start().starts_with('{') => {
                parse_sdk_auth(&Zeroizing::new(value)).map(Some)
            }
            Ok(value) if !value.trim().is_empty() => {
                read_sdk_auth_file(Path::new(value.trim())).map(Some)
            }
            _ => Ok(None)
        }
    }

    fn principal_from_arm_env(&self) -> Option<ServicePrincipal> {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Some(ServicePrincipal::new(
            read(ARM_CLIENT_ID)?,
            read(ARM_CLIENT_SECRET)?,
            read(ARM_SUBSCRIPTION_ID)?,
            read(ARM_TENANT_ID)?
        ))
    }

    fn cli_session(&self) -> Option<AzureCredentials> {
        if !self.config.allow_cli_login {
            return None;
        }

        let output = Command::new(&self.az_binary)
            .args(["account", "show", "--output", "json"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let subscription_id = serde_json::from_slice::<AccountShow>(&output.stdout)
                    .ok()
                    .and_then(|account| account.id);
                Some(AzureCredentials::AzureCli { subscription_id })
            }
            Ok(output) => {
                tracing::debug!("Azure CLI session unavailable: {}", output.status);
                None
            }
            Err(e) => {
                tracing::debug!("Azure CLI not usable ({}): {}", self.az_binary, e);
                None
            }
        }
    }
}

impl CredentialProbe for EnvironmentCredentialProbe {
    fn resolve(&self) -> AzureCredentials {
        match self.principal_from_files() {
            Ok(Some(principal)) => {
                tracing::debug!("Using Azure service principal from credentials file");
                return AzureCredentials::ServicePrincipal(principal);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Ignoring unusable Azure credentials: {}", e);
                return AzureCredentials::Unauthenticated;
            }
        }

        if let Some(principal) = self.principal_from_arm_env() {
            tracing::debug!("Using Azure service principal from ARM_* variables");
            return AzureCredentials::ServicePrincipal(principal);
        }

        if let Some(cli) = self.cli_session() {
            tracing::debug!("Using Azure CLI session");
            return cli;
        }

        AzureCredentials::Unauthenticated
    }
}

fn read_sdk_auth_file(path: &Path) -> Result<ServicePrincipal, CredentialError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CredentialError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string()
    })?;
    parse_sdk_auth(&Zeroizing::new(contents))
}

fn parse_sdk_auth(json: &str) -> Result<ServicePrincipal, CredentialError> {
    let auth: SdkAuth = serde_json::from_str(json).map_err(|e| CredentialError::Malformed {
        reason: e.to_string()
    })?;
    let client_secret = Zeroizing::new(required(auth.client_secret, "clientSecret")?);

    Ok(ServicePrincipal {
        client_id: required(auth.client_id, "clientId")?,
        client_secret,
        subscription_id: required(auth.subscription_id, "subscriptionId")?,
        tenant_id: required(auth.tenant_id, "tenantId")?
    })
}

fn required(value: Option<String>, field: &str) -> Result<String, CredentialError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingField {
            field: field.to_string()
        })
}
