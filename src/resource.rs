//! Resource management API: what a resource is, how it is addressed and the operations the
//! lifecycle performs on it.

pub mod arm_client;
pub mod error;
pub mod key_vault;
mod long_running;

pub use long_running::PollingPolicy;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::Token;
use error::ResourceClientError;

/// Coordinates of a resource inside a subscription.
///
/// The same value is used to create and to delete a resource, nothing is discovered from the
/// remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub resource_group: String,
    pub provider_namespace: String,
    /// Path of the parent resource for nested resources, empty otherwise.
    pub parent_resource_path: String,
    pub resource_type: String,
    pub resource_name: String,
    pub api_version: String,
}

impl ResourceDescriptor {
    /// Path segments of the resource below the subscription. Empty segments of the parent
    /// path are skipped, and multi-segment types are split.
    pub fn path_segments(&self) -> Vec<&str> {
        let mut segments = vec![
            "resourcegroups",
            self.resource_group.as_str(),
            "providers",
            self.provider_namespace.as_str(),
        ];
        segments.extend(self.parent_resource_path.split('/').filter(|s| !s.is_empty()));
        segments.extend(self.resource_type.split('/').filter(|s| !s.is_empty()));
        segments.push(self.resource_name.as_str());
        segments
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{} (api-version {})",
            self.resource_group,
            self.provider_namespace,
            self.resource_type,
            self.resource_name,
            self.api_version
        )
    }
}

/// Resource representation accepted and returned by the generic resource API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenericResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    /// Resource specific property bag.
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Operations the lifecycle needs from the resource management API. Every call is
/// authorized with the provided token.
pub trait ResourceClient {
    /// Creates the resource, or updates it if it already exists, returning the resource as
    /// stored by the remote side.
    fn create_or_update(
        &self,
        token: &Token,
        descriptor: &ResourceDescriptor,
        resource: &GenericResource,
    ) -> Result<GenericResource, ResourceClientError>;

    fn delete(&self, token: &Token, descriptor: &ResourceDescriptor)
    -> Result<(), ResourceClientError>;
}
