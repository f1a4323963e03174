use http::Uri;

// Known clouds. Each one exposes its own resource manager and the audience the identity
// endpoint has to be asked for.
const AZURE_CLOUD_RESOURCE_MANAGER_STR: &str = "https://management.azure.com/";
const AZURE_CLOUD_TOKEN_AUDIENCE_STR: &str = "https://management.core.windows.net/";

const AZURE_CHINA_RESOURCE_MANAGER_STR: &str = "https://management.chinacloudapi.cn/";
const AZURE_CHINA_TOKEN_AUDIENCE_STR: &str = "https://management.core.chinacloudapi.cn/";

const AZURE_US_GOVERNMENT_RESOURCE_MANAGER_STR: &str = "https://management.usgovcloudapi.net/";
const AZURE_US_GOVERNMENT_TOKEN_AUDIENCE_STR: &str = "https://management.core.usgovcloudapi.net/";

const AZURE_GERMAN_RESOURCE_MANAGER_STR: &str = "https://management.microsoftazure.de/";
const AZURE_GERMAN_TOKEN_AUDIENCE_STR: &str = "https://management.core.cloudapi.de/";

/// Represents the cloud the resources are managed in.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AzureEnvironment {
    #[default]
    AzureCloud,
    AzureChinaCloud,
    AzureUSGovernment,
    AzureGermanCloud,
    Custom {
        resource_manager_endpoint: Uri,
        token_audience: String,
    },
}

impl TryFrom<&str> for AzureEnvironment {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "azurecloud" => Ok(Self::AzureCloud),
            "azurechinacloud" => Ok(Self::AzureChinaCloud),
            "azureusgovernment" => Ok(Self::AzureUSGovernment),
            "azuregermancloud" => Ok(Self::AzureGermanCloud),
            _ => Err(format!("Invalid environment: {}", value)),
        }
    }
}

impl AzureEnvironment {
    /// Base URI of the resource management API, always ending with a slash.
    pub fn resource_manager_endpoint(&self) -> Uri {
        match self {
            Self::AzureCloud => Uri::from_static(AZURE_CLOUD_RESOURCE_MANAGER_STR),
            Self::AzureChinaCloud => Uri::from_static(AZURE_CHINA_RESOURCE_MANAGER_STR),
            Self::AzureUSGovernment => Uri::from_static(AZURE_US_GOVERNMENT_RESOURCE_MANAGER_STR),
            Self::AzureGermanCloud => Uri::from_static(AZURE_GERMAN_RESOURCE_MANAGER_STR),
            Self::Custom {
                resource_manager_endpoint,
                ..
            } => resource_manager_endpoint.to_owned(),
        }
    }

    /// The resource a managed identity token is requested for.
    pub fn token_audience(&self) -> &str {
        match self {
            Self::AzureCloud => AZURE_CLOUD_TOKEN_AUDIENCE_STR,
            Self::AzureChinaCloud => AZURE_CHINA_TOKEN_AUDIENCE_STR,
            Self::AzureUSGovernment => AZURE_US_GOVERNMENT_TOKEN_AUDIENCE_STR,
            Self::AzureGermanCloud => AZURE_GERMAN_TOKEN_AUDIENCE_STR,
            Self::Custom { token_audience, .. } => token_audience,
        }
    }
}
