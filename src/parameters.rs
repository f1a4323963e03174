use std::env::{self, VarError};
use std::path::PathBuf;
use std::str::FromStr;

use clap::error::ErrorKind;
use clap::{Args, Error, Subcommand, ValueEnum};
use http::Uri;

use crate::config::{IdentityEndpoint, IdentitySelector};
use crate::environment::AzureEnvironment;
use crate::http::config::{CaBundle, HttpConfig, ProxyConfig, ProxyError};
use crate::resource::key_vault::{DEFAULT_LOCATION, DEFAULT_VAULT_NAME};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Creates a Key Vault with the managed identity, waits for confirmation and deletes it.
    ///
    /// Subscription and resource group are read from `AZURE_SUBSCRIPTION_ID` and
    /// `RESOURCE_GROUP_NAME`, optionally set in a `.env` file.
    RunLifecycle {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Name of the vault to create and delete
        #[arg(long, default_value = DEFAULT_VAULT_NAME)]
        vault_name: String,

        /// Region of the vault
        #[arg(long, default_value = DEFAULT_LOCATION)]
        location: String,

        /// Delete without waiting for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Retrieve a managed identity token for the resource manager.
    RetrieveToken {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Select format how the Token should be obtained
        #[arg(long, required = true)]
        output_token_format: OutPutTokenFormat,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutPutTokenFormat {
    /// Returns only the access token without type or expiration day
    #[value(name = "Plain")]
    Plain,
    /// Returns full token information in json format
    #[value(name = "Json")]
    Json,
}

#[derive(Args, Debug, Clone, Default)]
pub struct IdentityArgs {
    /// Client id of the user assigned identity to use
    #[arg(long, conflicts_with_all = ["object_id", "msi_res_id"])]
    client_id: Option<String>,

    /// Object id of the user assigned identity to use
    #[arg(long, conflicts_with_all = ["client_id", "msi_res_id"])]
    object_id: Option<String>,

    /// Azure resource id of the user assigned identity to use
    #[arg(long, conflicts_with_all = ["client_id", "object_id"])]
    msi_res_id: Option<String>,

    /// Get the token from the instance metadata service instead of the VM extension
    #[arg(long)]
    imds: bool,

    /// Cloud to target. Defaults to `AZURE_ENVIRONMENT` or AzureCloud.
    #[arg(short, long)]
    environment: Option<Environments>,

    /// Custom endpoint configuration (only used if --environment=Custom).
    #[command(flatten)]
    endpoints: ExternalEndpoints,

    /// Proxy options. The url falls back to `HTTPS_PROXY`/`HTTP_PROXY`.
    #[command(flatten)]
    proxy: ProxyArgs,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum Environments {
    #[value(name = "AzureCloud")]
    AzureCloud,
    #[value(name = "AzureChinaCloud")]
    AzureChinaCloud,
    #[value(name = "AzureUSGovernment")]
    AzureUSGovernment,
    #[value(name = "AzureGermanCloud")]
    AzureGermanCloud,
    #[value(name = "Custom")]
    Custom,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExternalEndpoints {
    /// Resource manager base url. Required with '--environment Custom'.
    #[arg(long)]
    resource_manager_endpoint: Option<String>,

    /// Resource the token is requested for. Required with '--environment Custom'.
    #[arg(long)]
    token_audience: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProxyArgs {
    /// Proxy url: <protocol>://<user>:<password>@<host>:<port>. Defaults to HTTPS_PROXY or
    /// HTTP_PROXY. The identity endpoint is always reached directly.
    #[arg(long)]
    proxy_url: Option<String>,

    /// File with the proxy CA certificate in PEM format. Needs a proxy url
    #[arg(long)]
    proxy_ca_bundle_file: Option<PathBuf>,

    /// Directory whose `.pem` files hold the proxy CA certificates. Needs a proxy url
    #[arg(long)]
    proxy_ca_bundle_dir: Option<PathBuf>,
}

impl IdentityArgs {
    pub fn selector(&self) -> IdentitySelector {
        if let Some(client_id) = &self.client_id {
            IdentitySelector::ClientId(client_id.to_owned())
        } else if let Some(object_id) = &self.object_id {
            IdentitySelector::ObjectId(object_id.to_owned())
        } else if let Some(msi_res_id) = &self.msi_res_id {
            IdentitySelector::MsiResourceId(msi_res_id.to_owned())
        } else {
            IdentitySelector::SystemAssigned
        }
    }

    /// `--imds` wins over whatever the environment configures.
    pub fn endpoint_override(&self) -> Option<IdentityEndpoint> {
        self.imds.then_some(IdentityEndpoint::InstanceMetadata)
    }

    /// The environment selected on the command line, if any.
    pub fn environment(&self) -> Result<Option<AzureEnvironment>, Error> {
        self.environment
            .clone()
            .map(|environment| {
                select_environment(
                    environment,
                    self.endpoints.resource_manager_endpoint.clone(),
                    self.endpoints.token_audience.clone(),
                )
            })
            .transpose()
    }

    pub fn http_config(&self) -> Result<HttpConfig, ProxyError> {
        self.http_config_with(env::var)
    }

    fn http_config_with<F>(&self, env_var: F) -> Result<HttpConfig, ProxyError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let ca_bundle = CaBundle {
            file: self.proxy.proxy_ca_bundle_file.clone(),
            dir: self.proxy.proxy_ca_bundle_dir.clone(),
        };

        match ProxyConfig::resolve_with(self.proxy.proxy_url.as_deref(), env_var)? {
            Some(proxy) => Ok(HttpConfig::default().with_proxy(proxy.with_ca_bundle(ca_bundle))),
            None if ca_bundle.is_empty() => Ok(HttpConfig::default()),
            None => Err(ProxyError::CaBundleWithoutProxy),
        }
    }
}

pub fn select_environment(
    environment: Environments,
    resource_manager_url: Option<String>,
    token_audience: Option<String>,
) -> Result<AzureEnvironment, Error> {
    match environment {
        Environments::AzureCloud => Ok(AzureEnvironment::AzureCloud),
        Environments::AzureChinaCloud => Ok(AzureEnvironment::AzureChinaCloud),
        Environments::AzureUSGovernment => Ok(AzureEnvironment::AzureUSGovernment),
        Environments::AzureGermanCloud => Ok(AzureEnvironment::AzureGermanCloud),
        Environments::Custom => {
            let resource_manager_str = resource_manager_url.unwrap_or_default();
            let resource_manager_endpoint = Uri::from_str(&resource_manager_str).map_err(|e| {
                Error::raw(
                    ErrorKind::Format,
                    format!("Invalid resource manager URI: {}", e),
                )
            })?;
            let token_audience = token_audience.filter(|a| !a.is_empty()).ok_or_else(|| {
                Error::raw(
                    ErrorKind::MissingRequiredArgument,
                    "--token-audience is required with '--environment Custom'",
                )
            })?;

            Ok(AzureEnvironment::Custom {
                resource_manager_endpoint,
                token_audience,
            })
        }
    }
}
