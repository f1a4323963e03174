//! Process configuration. Everything the lifecycle needs from the environment is read once
//! into [LifecycleConfig] and handed to the components that need it.

use std::env;
use std::env::VarError;
use std::fmt;

use http::Uri;

use crate::environment::AzureEnvironment;

/// Port of the managed identity VM extension when `MSI_PORT` is not set.
pub const DEFAULT_MSI_PORT: u16 = 50342;
/// Instance metadata service token endpoint.
pub const IMDS_TOKEN_ENDPOINT_STR: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const TENANT_ID_ENV_NAME: &str = "AZURE_TENANT_ID";
const SUBSCRIPTION_ID_ENV_NAME: &str = "AZURE_SUBSCRIPTION_ID";
const RESOURCE_GROUP_ENV_NAME: &str = "RESOURCE_GROUP_NAME";
const MSI_PORT_ENV_NAME: &str = "MSI_PORT";
const MSI_ENDPOINT_ENV_NAME: &str = "MSI_ENDPOINT";
const ENVIRONMENT_ENV_NAME: &str = "AZURE_ENVIRONMENT";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    MissingVariable(&'static str),
    #[error("invalid value `{1}` for `{0}`: `{2}`")]
    InvalidValue(&'static str, String, String),
}

/// Which managed identity the token is requested for.
///
/// A compute instance always has at most one system assigned identity, so it needs no
/// selector. User assigned identities are picked by exactly one of the other variants.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IdentitySelector {
    #[default]
    SystemAssigned,
    ClientId(String),
    ObjectId(String),
    MsiResourceId(String),
}

impl IdentitySelector {
    /// Name and value of the request parameter selecting a user assigned identity.
    pub fn as_param(&self) -> Option<(&'static str, &str)> {
        match self {
            Self::SystemAssigned => None,
            Self::ClientId(id) => Some(("client_id", id)),
            Self::ObjectId(id) => Some(("object_id", id)),
            Self::MsiResourceId(id) => Some(("msi_res_id", id)),
        }
    }
}

impl fmt::Display for IdentitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_param() {
            None => write!(f, "system assigned identity"),
            Some((name, value)) => write!(f, "user assigned identity ({name}={value})"),
        }
    }
}

/// Where the managed identity token is obtained from.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityEndpoint {
    /// VM extension listening on localhost.
    Local { port: u16 },
    /// Instance metadata service.
    InstanceMetadata,
    /// Explicit endpoint speaking the same protocol as the VM extension.
    Custom(Uri),
}

impl Default for IdentityEndpoint {
    fn default() -> Self {
        Self::Local {
            port: DEFAULT_MSI_PORT,
        }
    }
}

impl IdentityEndpoint {
    /// Endpoint from `MSI_ENDPOINT`, falling back to the VM extension on `MSI_PORT` (or its
    /// default port).
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(env::var)
    }

    pub fn from_env_with<F>(env_var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let read = |name: &'static str| env_var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = read(MSI_ENDPOINT_ENV_NAME) {
            let uri = endpoint.trim().parse::<Uri>().map_err(|e| {
                ConfigError::InvalidValue(MSI_ENDPOINT_ENV_NAME, endpoint.clone(), e.to_string())
            })?;
            return Ok(Self::Custom(uri));
        }

        let port = match read(MSI_PORT_ENV_NAME) {
            Some(port) => port.trim().parse::<u16>().map_err(|e| {
                ConfigError::InvalidValue(MSI_PORT_ENV_NAME, port.clone(), e.to_string())
            })?,
            None => DEFAULT_MSI_PORT,
        };
        Ok(Self::Local { port })
    }

    pub fn token_uri(&self) -> Uri {
        match self {
            Self::Local { port } => format!("http://localhost:{port}/oauth2/token")
                .parse()
                .expect("localhost uri with a numeric port is always valid"),
            Self::InstanceMetadata => Uri::from_static(IMDS_TOKEN_ENDPOINT_STR),
            Self::Custom(uri) => uri.to_owned(),
        }
    }
}

/// Cloud named by `AZURE_ENVIRONMENT`, [AzureEnvironment::AzureCloud] when unset.
pub fn environment_from_env() -> Result<AzureEnvironment, ConfigError> {
    environment_from_env_with(env::var)
}

pub fn environment_from_env_with<F>(env_var: F) -> Result<AzureEnvironment, ConfigError>
where
    F: Fn(&'static str) -> Result<String, VarError>,
{
    match env_var(ENVIRONMENT_ENV_NAME).ok().filter(|v| !v.trim().is_empty()) {
        Some(name) => AzureEnvironment::try_from(name.trim())
            .map_err(|e| ConfigError::InvalidValue(ENVIRONMENT_ENV_NAME, name.clone(), e)),
        None => Ok(AzureEnvironment::default()),
    }
}

/// Identity related inputs. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityContext {
    pub tenant_id: Option<String>,
    pub subscription_id: String,
    pub endpoint: IdentityEndpoint,
    pub selector: IdentitySelector,
}

/// Everything a lifecycle run needs, loaded once at start.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub identity: IdentityContext,
    pub resource_group: String,
    pub environment: AzureEnvironment,
}

impl LifecycleConfig {
    /// Loads the configuration from the process environment.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(env::var)
    }

    /// Loads the configuration using the provided `env_var` function to read each variable.
    /// Empty values are considered unset.
    pub fn from_env_with<F>(env_var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let read = |name: &'static str| env_var(name).ok().filter(|v| !v.trim().is_empty());

        let subscription_id =
            read(SUBSCRIPTION_ID_ENV_NAME).ok_or(ConfigError::MissingVariable(SUBSCRIPTION_ID_ENV_NAME))?;
        let resource_group =
            read(RESOURCE_GROUP_ENV_NAME).ok_or(ConfigError::MissingVariable(RESOURCE_GROUP_ENV_NAME))?;

        let endpoint = IdentityEndpoint::from_env_with(&env_var)?;
        let environment = environment_from_env_with(&env_var)?;

        Ok(Self {
            identity: IdentityContext {
                tenant_id: read(TENANT_ID_ENV_NAME),
                subscription_id,
                endpoint,
                selector: IdentitySelector::default(),
            },
            resource_group,
            environment,
        })
    }

    pub fn with_selector(mut self, selector: IdentitySelector) -> Self {
        self.identity.selector = selector;
        self
    }

    pub fn with_endpoint(mut self, endpoint: IdentityEndpoint) -> Self {
        self.identity.endpoint = endpoint;
        self
    }

    pub fn with_environment(mut self, environment: AzureEnvironment) -> Self {
        self.environment = environment;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;

    fn load(vars: &[(&'static str, &'static str)]) -> Result<LifecycleConfig, ConfigError> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        LifecycleConfig::from_env_with(|k| {
            vars.get(k)
                .map(|v| v.to_string())
                .ok_or(VarError::NotPresent)
        })
    }

    #[test]
    fn defaults_when_optional_values_are_missing() {
        let config = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("RESOURCE_GROUP_NAME", "rg1"),
        ])
        .unwrap();

        assert_eq!(
            config,
            LifecycleConfig {
                identity: IdentityContext {
                    tenant_id: None,
                    subscription_id: "sub-1".to_string(),
                    endpoint: IdentityEndpoint::Local { port: 50342 },
                    selector: IdentitySelector::SystemAssigned,
                },
                resource_group: "rg1".to_string(),
                environment: AzureEnvironment::AzureCloud,
            }
        );
    }

    #[test]
    fn all_values_present() {
        let config = load(&[
            ("AZURE_TENANT_ID", "tenant-1"),
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("RESOURCE_GROUP_NAME", "rg1"),
            ("MSI_PORT", "50400"),
        ])
        .unwrap();

        assert_eq!(config.identity.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(config.identity.endpoint, IdentityEndpoint::Local { port: 50400 });
    }

    #[test]
    fn msi_endpoint_overrides_port() {
        let config = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("RESOURCE_GROUP_NAME", "rg1"),
            ("MSI_PORT", "50400"),
            ("MSI_ENDPOINT", "http://127.0.0.1:41741/msi/token"),
        ])
        .unwrap();

        assert_eq!(
            config.identity.endpoint.token_uri(),
            "http://127.0.0.1:41741/msi/token"
        );
    }

    #[rstest]
    #[case(&[("RESOURCE_GROUP_NAME", "rg1")], "AZURE_SUBSCRIPTION_ID")]
    #[case(&[("AZURE_SUBSCRIPTION_ID", "sub-1")], "RESOURCE_GROUP_NAME")]
    #[case(&[("AZURE_SUBSCRIPTION_ID", "sub-1"), ("RESOURCE_GROUP_NAME", " ")], "RESOURCE_GROUP_NAME")]
    fn missing_required_values(
        #[case] vars: &[(&'static str, &'static str)],
        #[case] expected: &'static str,
    ) {
        assert_eq!(load(vars).unwrap_err(), ConfigError::MissingVariable(expected));
    }

    #[test]
    fn named_environment() {
        let config = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("RESOURCE_GROUP_NAME", "rg1"),
            ("AZURE_ENVIRONMENT", "AzureChinaCloud"),
        ])
        .unwrap();

        assert_eq!(config.environment, AzureEnvironment::AzureChinaCloud);
    }

    #[test]
    fn unknown_environment() {
        let err = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("RESOURCE_GROUP_NAME", "rg1"),
            ("AZURE_ENVIRONMENT", "moon"),
        ])
        .unwrap_err();

        assert_matches!(err, ConfigError::InvalidValue("AZURE_ENVIRONMENT", _, _));
    }

    #[test]
    fn invalid_port() {
        let err = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("RESOURCE_GROUP_NAME", "rg1"),
            ("MSI_PORT", "not-a-port"),
        ])
        .unwrap_err();

        assert_matches!(err, ConfigError::InvalidValue("MSI_PORT", value, _) => {
            assert_eq!(value, "not-a-port");
        });
    }

    #[test]
    fn endpoint_alone_needs_no_lifecycle_variables() {
        let endpoint = IdentityEndpoint::from_env_with(|k| match k {
            "MSI_PORT" => Ok("50400".to_string()),
            _ => Err(VarError::NotPresent),
        })
        .unwrap();

        assert_eq!(endpoint, IdentityEndpoint::Local { port: 50400 });
    }

    #[test]
    fn invalid_msi_endpoint() {
        let err = IdentityEndpoint::from_env_with(|k| match k {
            "MSI_ENDPOINT" => Ok("http://[::1".to_string()),
            _ => Err(VarError::NotPresent),
        })
        .unwrap_err();

        assert_matches!(err, ConfigError::InvalidValue("MSI_ENDPOINT", _, _));
    }

    #[rstest]
    #[case(IdentityEndpoint::Local { port: 50342 }, "http://localhost:50342/oauth2/token")]
    #[case(IdentityEndpoint::InstanceMetadata, IMDS_TOKEN_ENDPOINT_STR)]
    fn token_uris(#[case] endpoint: IdentityEndpoint, #[case] expected: &str) {
        assert_eq!(endpoint.token_uri().to_string(), expected);
    }

    #[rstest]
    #[case(IdentitySelector::SystemAssigned, None)]
    #[case(IdentitySelector::ClientId("c".into()), Some(("client_id", "c")))]
    #[case(IdentitySelector::ObjectId("o".into()), Some(("object_id", "o")))]
    #[case(IdentitySelector::MsiResourceId("/subscriptions/x".into()), Some(("msi_res_id", "/subscriptions/x")))]
    fn selector_params(
        #[case] selector: IdentitySelector,
        #[case] expected: Option<(&'static str, &str)>,
    ) {
        assert_eq!(selector.as_param(), expected);
    }
}
