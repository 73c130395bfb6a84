//! Request and response bodies.

use serde::{Deserialize, Serialize};

/// How the controller should treat a provisioned client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePolicy {
    #[serde(rename = "Group policy")]
    GroupPolicy,
    #[serde(rename = "Normal")]
    Normal,
}

/// One client entry of a provisioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionClient {
    pub mac: String,
    pub name: String,
}

/// Body of `POST /networks/{networkId}/clients/provision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub clients: Vec<ProvisionClient>,
    pub device_policy: DevicePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_policy_id: Option<String>,
}

impl ProvisionRequest {
    /// A single-client request; `Group policy` when a group is given,
    /// `Normal` otherwise.
    #[must_use]
    pub fn single(mac: &str, name: &str, group: Option<&str>) -> Self {
        Self {
            clients: vec![ProvisionClient {
                mac: mac.to_string(),
                name: name.to_string(),
            }],
            device_policy: if group.is_some() {
                DevicePolicy::GroupPolicy
            } else {
                DevicePolicy::Normal
            },
            group_policy_id: group.map(str::to_string),
        }
    }
}

/// Error body returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiErrors {
    #[serde(default)]
    pub errors: Vec<String>,
}
