//! Polling of resource manager long running operations.
//!
//! A PUT or DELETE answered with `201`/`202` may carry either an `Azure-AsyncOperation`
//! header, pointing to an operation status document, or a `Location` header, which keeps
//! answering `202` until the operation is over.

use std::time::Duration;

use http::header::{HeaderMap, LOCATION, RETRY_AFTER};
use http::Uri;
use serde::Deserialize;

use super::error::{ErrorDetail, ResourceClientError};

pub(super) const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// How often, and how many times, a long running operation is polled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollingPolicy {
    /// Delay between polls when the server does not ask for a specific one.
    pub interval: Duration,
    pub max_polls: u32,
}

/// Server requested delays are honoured up to this many default intervals.
const MAX_RETRY_AFTER_INTERVALS: u32 = 10;

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_polls: 120,
        }
    }
}

impl PollingPolicy {
    /// Delay before the next poll: the server's `Retry-After`, capped, or the default interval.
    pub(super) fn delay(&self, headers: &HeaderMap) -> Duration {
        let cap = self.interval.saturating_mul(MAX_RETRY_AFTER_INTERVALS);
        retry_after(headers)
            .map(|requested| requested.min(cap))
            .unwrap_or(self.interval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum PollTarget {
    AsyncOperation(Uri),
    Location(Uri),
}

impl PollTarget {
    /// `Azure-AsyncOperation` takes precedence over `Location` when both are present.
    pub(super) fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ResourceClientError> {
        let header_uri = |name: &str| -> Result<Option<Uri>, ResourceClientError> {
            headers
                .get(name)
                .map(|value| {
                    value
                        .to_str()
                        .map_err(|e| ResourceClientError::Decoder(e.to_string()))?
                        .parse::<Uri>()
                        .map_err(|e| ResourceClientError::Decoder(format!("invalid `{name}` header: {e}")))
                })
                .transpose()
        };

        if let Some(uri) = header_uri(AZURE_ASYNC_OPERATION)? {
            return Ok(Some(Self::AsyncOperation(uri)));
        }
        Ok(header_uri(LOCATION.as_str())?.map(Self::Location))
    }

    pub(super) fn uri(&self) -> &Uri {
        match self {
            Self::AsyncOperation(uri) | Self::Location(uri) => uri,
        }
    }
}

/// Delay requested by the server through `Retry-After`, in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Body of an `Azure-AsyncOperation` status document.
#[derive(Debug, Deserialize)]
pub(super) struct OperationStatus {
    pub(super) status: String,
    #[serde(default)]
    pub(super) error: Option<ErrorDetail>,
}

#[derive(Debug, PartialEq)]
pub(super) enum OperationState {
    InProgress,
    Succeeded,
}

impl OperationStatus {
    pub(super) fn state(self) -> Result<OperationState, ResourceClientError> {
        match self.status.as_str() {
            "Succeeded" => Ok(OperationState::Succeeded),
            "Failed" | "Canceled" => Err(ResourceClientError::OperationFailed {
                status: self.status,
                message: self.error.map(|e| e.message).unwrap_or_default(),
            }),
            _ => Ok(OperationState::InProgress),
        }
    }
}
