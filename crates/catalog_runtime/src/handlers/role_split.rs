//! Custom resource handler that splits the role name off a role ARN.
//!
//! Every invocation answers the orchestrator exactly once: parse failures,
//! derivation errors and panics all become a `FAILED` response. Only a missing
//! callback endpoint or a failed delivery leaves the orchestrator unanswered,
//! and both are logged at error level.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use catalog_core::error::{DeliveryError, LifecycleError};
use catalog_core::lifecycle::{
    physical_resource_id_for, CallbackBody, LifecycleEvent, LifecycleResponse, RequestEnvelope,
    RequestKind, ResponseStatus, ROLE_ARN_PROPERTY, ROLE_NAME_OUTPUT, UNIDENTIFIED_PHYSICAL_ID,
};
use catalog_core::role_name::role_name_from_arn;
use serde::Serialize;
use serde_json::Value;

use crate::adapters::callback::ResponseSink;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);
pub const TIMEOUT_ENV: &str = "ROLE_SPLIT_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSplitConfig {
    /// Wall-clock budget for the whole invocation, delivery included.
    pub timeout: Duration,
}

impl Default for RoleSplitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RoleSplitConfig {
    /// Reads the budget from the environment. An invalid value falls back to
    /// the default so that the event can still be answered.
    pub fn from_env() -> Self {
        match std::env::var(TIMEOUT_ENV) {
            Ok(raw) => Self::from_timeout_value(&raw),
            Err(_) => Self::default(),
        }
    }

    fn from_timeout_value(raw: &str) -> Self {
        match raw.trim().parse::<u64>() {
            Ok(seconds) if seconds > 0 => Self {
                timeout: Duration::from_secs(seconds),
            },
            _ => {
                tracing::warn!(value = raw, "invalid {TIMEOUT_ENV}, using default timeout");
                Self::default()
            }
        }
    }

    /// Caps the budget at `limit` (for example the invocation deadline).
    pub fn bounded_by(mut self, limit: Duration) -> Self {
        self.timeout = self.timeout.min(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationOutcome {
    pub status: ResponseStatus,
    pub physical_resource_id: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

pub fn handle_lifecycle_event(
    event: &Value,
    config: &RoleSplitConfig,
    sink: &impl ResponseSink,
) -> InvocationOutcome {
    let started_at = Instant::now();
    let envelope = RequestEnvelope::from_raw(event);
    let request_type = event
        .get("RequestType")
        .and_then(Value::as_str)
        .unwrap_or("-");
    tracing::info!(
        request_id = %envelope.request_id,
        logical_resource_id = %envelope.logical_resource_id,
        request_type,
        "lifecycle_event_received"
    );

    let response = respond_to(event, &envelope);
    if let Some(reason) = &response.reason {
        tracing::warn!(request_id = %envelope.request_id, reason = %reason, "lifecycle_event_failed");
    }

    let status = response.status;
    let physical_resource_id = response.physical_resource_id.clone();
    let delivery = deliver(&envelope, response, config, started_at, sink);

    match &delivery {
        Ok(()) => tracing::info!(
            request_id = %envelope.request_id,
            status = ?status,
            physical_resource_id = %physical_resource_id,
            duration_ms = started_at.elapsed().as_millis() as u64,
            "lifecycle_response_delivered"
        ),
        Err(error) => tracing::error!(
            request_id = %envelope.request_id,
            status = ?status,
            error = %error,
            "lifecycle_response_delivery_failed"
        ),
    }

    InvocationOutcome {
        status,
        physical_resource_id,
        delivered: delivery.is_ok(),
        delivery_error: delivery.err().map(|error| error.to_string()),
    }
}

/// Computes the response for a lifecycle event without any side effect.
pub fn derive_response(event: &LifecycleEvent) -> Result<LifecycleResponse, LifecycleError> {
    match event.request_type {
        RequestKind::Create | RequestKind::Update => {
            let role_arn = event.required_property(ROLE_ARN_PROPERTY)?;
            let role_name = role_name_from_arn(role_arn)?;
            Ok(LifecycleResponse::success(
                physical_resource_id_for(role_arn),
                BTreeMap::from([(ROLE_NAME_OUTPUT.to_string(), role_name)]),
            ))
        }
        // Nothing was provisioned, so there is nothing to tear down.
        RequestKind::Delete => Ok(LifecycleResponse::success(
            [
                event.physical_resource_id.as_deref(),
                Some(event.logical_resource_id.as_str()),
            ]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
            .unwrap_or(UNIDENTIFIED_PHYSICAL_ID),
            BTreeMap::new(),
        )),
    }
}

fn respond_to(raw: &Value, envelope: &RequestEnvelope) -> LifecycleResponse {
    let event = match serde_json::from_value::<LifecycleEvent>(raw.clone()) {
        Ok(event) => event,
        Err(error) => {
            return LifecycleResponse::failed(
                envelope.fallback_physical_id(),
                LifecycleError::MalformedEvent(error.to_string()).to_string(),
            );
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| derive_response(&event))) {
        Ok(Ok(response)) => response,
        Ok(Err(error)) => {
            LifecycleResponse::failed(envelope.fallback_physical_id(), error.to_string())
        }
        Err(payload) => LifecycleResponse::failed(
            envelope.fallback_physical_id(),
            format!("role split handler panicked: {}", panic_message(payload.as_ref())),
        ),
    }
}

fn deliver(
    envelope: &RequestEnvelope,
    response: LifecycleResponse,
    config: &RoleSplitConfig,
    started_at: Instant,
    sink: &impl ResponseSink,
) -> Result<(), DeliveryError> {
    let endpoint = envelope
        .response_url
        .as_deref()
        .ok_or(DeliveryError::MissingEndpoint)?;

    let remaining = config.timeout.saturating_sub(started_at.elapsed());
    if remaining.is_zero() {
        return Err(DeliveryError::BudgetExhausted);
    }

    let body = serde_json::to_vec(&CallbackBody::new(envelope, response))
        .map_err(|error| DeliveryError::Serialization(error.to_string()))?;
    sink.deliver(endpoint, &body, remaining)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
