//! The Key Vault managed by the lifecycle.

use serde_json::json;

use super::{GenericResource, ResourceDescriptor};

pub const PROVIDER_NAMESPACE: &str = "Microsoft.KeyVault";
pub const RESOURCE_TYPE: &str = "vaults";
pub const API_VERSION: &str = "2015-06-01";
pub const DEFAULT_LOCATION: &str = "westcentralus";
pub const DEFAULT_VAULT_NAME: &str = "sampleVault8976";

/// Name and region of the vault to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultOptions {
    pub name: String,
    pub location: String,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_VAULT_NAME.to_string(),
            location: DEFAULT_LOCATION.to_string(),
        }
    }
}

/// Coordinates of the vault `vault_name` inside `resource_group`.
pub fn descriptor(resource_group: &str, vault_name: &str) -> ResourceDescriptor {
    ResourceDescriptor {
        resource_group: resource_group.to_string(),
        provider_namespace: PROVIDER_NAMESPACE.to_string(),
        parent_resource_path: String::new(),
        resource_type: RESOURCE_TYPE.to_string(),
        resource_name: vault_name.to_string(),
        api_version: API_VERSION.to_string(),
    }
}

/// Standard vault without access policies, usable for deployments, template deployments and
/// disk encryption. A missing tenant is sent as `null`.
pub fn parameters(tenant_id: Option<&str>, location: &str) -> GenericResource {
    GenericResource {
        location: Some(location.to_string()),
        properties: json!({
            "sku": { "family": "A", "name": "standard" },
            "tenantId": tenant_id,
            "accessPolicies": [],
            "enabledForDeployment": true,
            "enabledForTemplateDeployment": true,
            "enabledForDiskEncryption": true,
        }),
        ..Default::default()
    }
}
