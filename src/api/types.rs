//! API request and response types

use crate::backend::{AccessLevel, ProcessingConfig, SessionSummary, UserProfile};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Batch answers to the outstanding ambiguity questions
#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    pub answers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub config: ProcessingConfig,
}

/// Share link for the session in the path
#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(default)]
    pub access_level: AccessLevel,
    /// People to invite; the backend validates the addresses
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse<T> {
    pub session: T,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserProfile,
}

/// Response for user actions handed to a session runtime
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    /// The analytics backend's own health report, or why it could not be
    /// fetched
    pub backend: serde_json::Value,
}
