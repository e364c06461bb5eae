//! Backend error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analytics backend error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
    /// Error code from the envelope (`AUTH_REQUIRED`, `ERROR_404`, ...)
    pub code: Option<String>,
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            status: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Classify an error payload returned by the backend.
    ///
    /// The envelope's code wins over the status: `AUTH_REQUIRED` and
    /// `INVALID_SESSION` both mean the login cookie is gone.
    pub fn from_envelope(status: u16, code: Option<String>, message: String) -> Self {
        let kind = match code.as_deref() {
            Some("AUTH_REQUIRED" | "INVALID_SESSION") => ErrorKind::Auth,
            _ => ErrorKind::from_status(status),
        };
        let err = Self::new(kind, message).with_status(status);
        match code {
            Some(code) => err.with_code(code),
            None => err,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

/// Error classification for retry and recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or expired login (401, 403)
    Auth,
    /// Session or resource does not exist (404)
    NotFound,
    /// Rejected input (400, 422)
    BadRequest,
    /// Request not valid for the session's current step (409)
    Conflict,
    /// Backend failure (5xx) - retryable
    Server,
    /// Transport failure or timeout - retryable
    Network,
    /// Response did not match the expected shape
    Decode,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            409 => Self::Conflict,
            500..=599 => Self::Server,
            _ => Self::BadRequest,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Server)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_decode() {
            Self::decode(format!("Malformed response: {e}"))
        } else {
            Self::network(format!("Request failed: {e}"))
        }
    }
}
