//! CloudFormation custom resource request/response contract.
//!
//! The orchestrator sends a [`LifecycleEvent`] and waits for exactly one
//! [`CallbackBody`] on the presigned `ResponseURL`. Field names follow the
//! orchestrator's wire format and must not change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::LifecycleError;

pub const ROLE_ARN_PROPERTY: &str = "RoleArn";
pub const ROLE_NAME_OUTPUT: &str = "RoleName";
pub const PHYSICAL_ID_PREFIX: &str = "role-split-";
pub const UNIDENTIFIED_PHYSICAL_ID: &str = "role-split-unidentified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestKind,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(default)]
    pub stack_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<BTreeMap<String, Value>>,
}

impl LifecycleEvent {
    /// Looks up a string resource property. Missing and non-string values are
    /// both reported as missing.
    pub fn required_property(&self, name: &str) -> Result<&str, LifecycleError> {
        self.resource_properties
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| LifecycleError::MissingRequiredProperty(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleResponse {
    pub status: ResponseStatus,
    pub physical_resource_id: String,
    pub reason: Option<String>,
    pub data: BTreeMap<String, String>,
}

impl LifecycleResponse {
    pub fn success(physical_resource_id: impl Into<String>, data: BTreeMap<String, String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            physical_resource_id: physical_resource_id.into(),
            reason: None,
            data,
        }
    }

    pub fn failed(physical_resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: ResponseStatus::Failed,
            physical_resource_id: physical_resource_id.into(),
            reason: Some(if reason.trim().is_empty() {
                "unknown failure".to_string()
            } else {
                reason
            }),
            data: BTreeMap::new(),
        }
    }
}

/// Request identity fields, extracted leniently so that even an event that
/// fails to parse can still be answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub response_url: Option<String>,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub physical_resource_id: Option<String>,
}

impl RequestEnvelope {
    pub fn from_raw(event: &Value) -> Self {
        let field = |name: &str| {
            event
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            response_url: field("ResponseURL").filter(|url| !url.trim().is_empty()),
            stack_id: field("StackId").unwrap_or_default(),
            request_id: field("RequestId").unwrap_or_default(),
            logical_resource_id: field("LogicalResourceId").unwrap_or_default(),
            physical_resource_id: field("PhysicalResourceId").filter(|id| !id.is_empty()),
        }
    }

    /// Physical id to report when the handler could not compute one. Never
    /// empty.
    pub fn fallback_physical_id(&self) -> String {
        [
            self.physical_resource_id.as_deref(),
            Some(self.logical_resource_id.as_str()),
            Some(self.request_id.as_str()),
        ]
        .into_iter()
        .flatten()
        .find(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNIDENTIFIED_PHYSICAL_ID.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackBody {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub no_echo: bool,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl CallbackBody {
    pub fn new(envelope: &RequestEnvelope, response: LifecycleResponse) -> Self {
        Self {
            status: response.status,
            reason: response.reason,
            physical_resource_id: response.physical_resource_id,
            stack_id: envelope.stack_id.clone(),
            request_id: envelope.request_id.clone(),
            logical_resource_id: envelope.logical_resource_id.clone(),
            no_echo: false,
            data: response.data,
        }
    }
}

/// Stable physical id for a role ARN: the same input always addresses the
/// same resource, a changed ARN yields a replacement.
pub fn physical_resource_id_for(role_arn: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role_arn.trim().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{PHYSICAL_ID_PREFIX}{}", &digest[..16])
}
