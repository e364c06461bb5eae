//! Analytics backend client
//!
//! The backend owns sessions, ambiguity questions and the simulated
//! processing pipeline. Every call goes through [`AnalyticsBackend`] so the
//! runtime can be driven by a mock in tests.

mod envelope;
mod error;
mod http;
pub mod types;

pub use envelope::Envelope;
pub use error::{BackendError, ErrorKind};
pub use http::HttpBackend;
pub use types::*;

use crate::session::Message;
use async_trait::async_trait;

/// Operations the console needs from the analytics backend
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    /// Log in; the backend answers with a session cookie kept by the client
    async fn login(&self, email: &str, password: &str) -> Result<UserProfile, BackendError>;

    async fn logout(&self) -> Result<(), BackendError>;

    /// The logged-in user; fails with an auth error when there is none
    async fn profile(&self) -> Result<UserProfile, BackendError>;

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionSummary, BackendError>;

    async fn list_sessions(
        &self,
        search: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SessionSummary>, BackendError>;

    /// Session with its transcript
    async fn get_session(&self, session_id: &str) -> Result<SessionDetail, BackendError>;

    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError>;

    /// Post a user message. Returns the stored user message followed by any
    /// messages the backend generated in response.
    async fn create_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<Vec<Message>, BackendError>;

    async fn questions(&self, session_id: &str) -> Result<QuestionSet, BackendError>;

    /// Submit one answer, or several in batch mode
    async fn answer(
        &self,
        session_id: &str,
        answers: &[String],
    ) -> Result<AnswerOutcome, BackendError>;

    /// Reopen ambiguity resolution with additional questions
    async fn continue_resolving(
        &self,
        session_id: &str,
    ) -> Result<ResolutionContinued, BackendError>;

    /// Context summary (domain, scope, regions, metrics) shown for confirmation
    async fn context(&self, session_id: &str) -> Result<Document, BackendError>;

    async fn confirm_context(&self, session_id: &str) -> Result<(), BackendError>;

    async fn start_processing(
        &self,
        session_id: &str,
        config: &ProcessingConfig,
    ) -> Result<ProcessingStarted, BackendError>;

    async fn processing_status(&self, session_id: &str)
        -> Result<ProcessingSnapshot, BackendError>;

    async fn processing_logs(&self, session_id: &str)
        -> Result<Vec<ProcessingLog>, BackendError>;

    async fn stop_processing(&self, session_id: &str) -> Result<(), BackendError>;

    /// Skip the remaining simulation and publish the result message
    async fn complete_processing(&self, session_id: &str) -> Result<(), BackendError>;

    async fn results(&self, session_id: &str) -> Result<Document, BackendError>;

    /// Run the backend's verification checks over a session's results
    async fn verify_results(&self, session_id: &str) -> Result<Document, BackendError>;

    async fn create_share(&self, request: &ShareRequest) -> Result<Document, BackendError>;

    /// Open a shared session by its token; needs no login
    async fn get_share(&self, token: &str) -> Result<Document, BackendError>;

    async fn revoke_share(&self, token: &str) -> Result<(), BackendError>;

    async fn domains(&self) -> Result<Document, BackendError>;

    async fn models(&self) -> Result<Document, BackendError>;

    async fn health(&self) -> Result<Document, BackendError>;
}
