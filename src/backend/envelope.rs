//! The `{success, timestamp, data | error}` wrapper every endpoint speaks

use super::error::BackendError;
use serde::{Deserialize, Serialize};

/// Response envelope.
///
/// The same shape is decoded from the analytics backend and emitted by the
/// local API, so clients of either see one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            timestamp: Some(now()),
            data: Some(data),
            error: None,
        }
    }

    /// Error envelope; the code defaults to `ERROR_{status}` like the backend's.
    pub fn failure(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: Some(now()),
            data: None,
            error: Some(ErrorBody {
                message: message.into(),
                code: Some(code.map_or_else(|| format!("ERROR_{status}"), str::to_string)),
                status_code: Some(status),
            }),
        }
    }

    /// Unwrap the payload, classifying failures.
    ///
    /// `http_status` is used when the error body carries no `status_code`.
    pub fn into_result(self, http_status: u16) -> Result<T, BackendError> {
        if self.success {
            return self
                .data
                .ok_or_else(|| BackendError::decode("Envelope reported success without data"));
        }

        match self.error {
            Some(body) => Err(BackendError::from_envelope(
                body.status_code.unwrap_or(http_status),
                body.code,
                body.message,
            )),
            None => Err(BackendError::from_envelope(
                http_status,
                None,
                format!("Request failed with status {http_status}"),
            )),
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
