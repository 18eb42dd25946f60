//! Service Bus connection string parsing.
//!
//! A connection string is a `;`-separated list of `Key=Value` tokens:
//!
//! ```text
//! Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=K;SharedAccessKey=V
//! ```
//!
//! Keys are case-insensitive, values are split on the first `=` so base64
//! padding survives, and unknown keys are ignored.

use errors::ConnectionStringError;
use std::fmt;
use std::str::FromStr;
use url::Url;
use zeroize::Zeroizing;

const ENDPOINT: &str = "Endpoint";
const SHARED_ACCESS_KEY_NAME: &str = "SharedAccessKeyName";
const SHARED_ACCESS_KEY: &str = "SharedAccessKey";
const SHARED_ACCESS_SIGNATURE: &str = "SharedAccessSignature";
const USE_DEVELOPMENT_EMULATOR: &str = "UseDevelopmentEmulator";

/// Turns a raw connection string into structured properties.
pub trait ConnectionStringParser {
    fn parse(&self, raw: &str) -> Result<ServiceBusConnectionProperties, ConnectionStringError>;
}

/// Parser for the Azure Service Bus connection string format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceBusConnectionStringParser;

impl ConnectionStringParser for ServiceBusConnectionStringParser {
    fn parse(&self, raw: &str) -> Result<ServiceBusConnectionProperties, ConnectionStringError> {
        ServiceBusConnectionProperties::parse(raw)
    }
}

/// Structured view of a Service Bus connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceBusConnectionProperties {
    endpoint: String,
    fully_qualified_namespace: String,
    shared_access_key_name: Option<String>,
    shared_access_key: Option<Zeroizing<String>>,
    shared_access_signature: Option<Zeroizing<String>>,
    entity_path: Option<String>,
    use_development_emulator: bool
}

#[derive(Default)]
struct RawTokens {
    endpoint: Option<String>,
    shared_access_key_name: Option<String>,
    shared_access_key: Option<String>,
    shared_access_signature: Option<String>,
    entity_path: Option<String>,
    use_development_emulator: Option<String>
}

impl ServiceBusConnectionProperties {
    pub fn parse(raw: &str) -> Result<Self, ConnectionStringError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let mut tokens = RawTokens::default();
        for segment in raw.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (key, value) = match segment.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                    (key.trim(), value.trim())
                }
                // Only the key half is echoed back; values may be secrets.
                Some((key, _)) => {
                    return Err(ConnectionStringError::MalformedToken {
                        token: key.trim().to_string()
                    });
                }
                None => {
                    return Err(ConnectionStringError::MalformedToken {
                        token: segment.to_string()
                    });
                }
            };

            let slot = match key.to_ascii_lowercase().as_str() {
                "endpoint" => &mut tokens.endpoint,
                "sharedaccesskeyname" => &mut tokens.shared_access_key_name,
                "sharedaccesskey" => &mut tokens.shared_access_key,
                "sharedaccesssignature" => &mut tokens.shared_access_signature,
                "entitypath" => &mut tokens.entity_path,
                "usedevelopmentemulator" => &mut tokens.use_development_emulator,
                _ => {
                    tracing::debug!("Ignoring unknown connection string key {}", key);
                    continue;
                }
            };

            if slot.is_some() {
                return Err(ConnectionStringError::DuplicateKey {
                    key: key.to_string()
                });
            }
            *slot = Some(value.to_string());
        }

        Self::from_tokens(tokens)
    }

    fn from_tokens(tokens: RawTokens) -> Result<Self, ConnectionStringError> {
        let endpoint = tokens
            .endpoint
            .ok_or_else(|| ConnectionStringError::MissingKey {
                key: ENDPOINT.to_string()
            })?;
        let (endpoint, fully_qualified_namespace) = normalize_endpoint(&endpoint)?;

        let use_development_emulator = match tokens.use_development_emulator {
            Some(value) => value.to_ascii_lowercase().parse::<bool>().map_err(|_| {
                ConnectionStringError::InvalidValue {
                    key: USE_DEVELOPMENT_EMULATOR.to_string(),
                    value
                }
            })?,
            None => false
        };

        let key_name = tokens.shared_access_key_name;
        let key = tokens.shared_access_key.map(Zeroizing::new);
        let signature = tokens.shared_access_signature.map(Zeroizing::new);

        if signature.is_some() && (key_name.is_some() || key.is_some()) {
            return Err(ConnectionStringError::ConflictingCredentials {
                reason: "a shared access signature cannot be combined with a shared access key"
                    .to_string()
            });
        }
        match (&key_name, &key, &signature) {
            (Some(_), None, _) => {
                return Err(ConnectionStringError::MissingKey {
                    key: SHARED_ACCESS_KEY.to_string()
                });
            }
            (None, Some(_), _) => {
                return Err(ConnectionStringError::MissingKey {
                    key: SHARED_ACCESS_KEY_NAME.to_string()
                });
            }
            (None, None, None) => {
                return Err(ConnectionStringError::MissingKey {
                    key: format!("{} or {}", SHARED_ACCESS_KEY_NAME, SHARED_ACCESS_SIGNATURE)
                });
            }
            _ => {}
        }

        Ok(Self {
            endpoint,
            fully_qualified_namespace,
            shared_access_key_name: key_name,
            shared_access_key: key,
            shared_access_signature: signature,
            entity_path: tokens.entity_path,
            use_development_emulator
        })
    }

    /// Endpoint normalised to the `sb` scheme, e.g. `sb://ns.servicebus.windows.net/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Host of the endpoint, e.g. `ns.servicebus.windows.net`.
    pub fn fully_qualified_namespace(&self) -> &str {
        &self.fully_qualified_namespace
    }

    pub fn shared_access_key_name(&self) -> Option<&str> {
        self.shared_access_key_name.as_deref()
    }

    pub fn shared_access_key(&self) -> Option<&str> {
        self.shared_access_key.as_ref().map(|key| key.as_str())
    }

    pub fn shared_access_signature(&self) -> Option<&str> {
        self.shared_access_signature
            .as_ref()
            .map(|signature| signature.as_str())
    }

    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }

    pub fn use_development_emulator(&self) -> bool {
        self.use_development_emulator
    }
}

impl FromStr for ServiceBusConnectionProperties {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ServiceBusConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |present: bool| if present { Some("<redacted>") } else { None };
        f.debug_struct("ServiceBusConnectionProperties")
            .field("endpoint", &self.endpoint)
            .field("fully_qualified_namespace", &self.fully_qualified_namespace)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &redact(self.shared_access_key.is_some()))
            .field(
                "shared_access_signature",
                &redact(self.shared_access_signature.is_some())
            )
            .field("entity_path", &self.entity_path)
            .field("use_development_emulator", &self.use_development_emulator)
            .finish()
    }
}

/// Returns the `sb://` endpoint and its host.
fn normalize_endpoint(raw: &str) -> Result<(String, String), ConnectionStringError> {
    let invalid = |reason: &str| ConnectionStringError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: reason.to_string()
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host"))?
        .to_string();

    let endpoint = match url.port() {
        Some(port) => format!("sb://{}:{}/", host, port),
        None => format!("sb://{}/", host)
    };
    Ok((endpoint, host))
}
