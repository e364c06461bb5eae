//! reqwest implementation of the backend contract

use super::envelope::Envelope;
use super::error::BackendError;
use super::types::{
    AnswerOutcome, AnswerResponse, CreateSessionRequest, Document, LogsResponse,
    MessagesResponse, ProcessingConfig, ProcessingLog, ProcessingSnapshot, ProcessingStarted,
    QuestionSet, ResolutionContinued, SessionDetail, SessionEnvelope, SessionListResponse,
    SessionSummary, ShareRequest, UserProfile, UserResponse,
};
use super::AnalyticsBackend;
use crate::session::Message;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Longest slice of an undecodable body kept in error messages
const ERROR_BODY_CHARS: usize = 200;

/// HTTP client for the analytics backend.
///
/// The cookie store carries the login session between calls, so one
/// instance should be shared by everything acting on behalf of a user.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        self.send(path, self.client.get(self.url(path))).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        self.send(path, self.client.delete(self.url(path))).await
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.send(path, self.client.post(self.url(path)).json(body))
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        tracing::debug!(path, "Backend request");

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            let excerpt: String = body.chars().take(ERROR_BODY_CHARS).collect();
            if status >= 400 {
                BackendError::from_envelope(status, None, format!("HTTP {status}: {excerpt}"))
            } else {
                BackendError::decode(format!("Unexpected response from {path}: {e}"))
            }
        })?;

        let result = envelope.into_result(status);
        if let Err(e) = &result {
            tracing::debug!(path, status, kind = ?e.kind, error = %e, "Backend request failed");
        }
        result
    }
}

#[async_trait]
impl AnalyticsBackend for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<UserProfile, BackendError> {
        let resp: UserResponse = self
            .post(
                "/api/auth/login",
                &json!({ "email": email, "password": password }),
            )
            .await?;
        Ok(resp.user)
    }

    async fn logout(&self) -> Result<(), BackendError> {
        let _: IgnoredAny = self.post("/api/auth/logout", &json!({})).await?;
        Ok(())
    }

    async fn profile(&self) -> Result<UserProfile, BackendError> {
        let resp: UserResponse = self.get("/api/auth/profile").await?;
        Ok(resp.user)
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionSummary, BackendError> {
        let resp: SessionEnvelope<SessionSummary> =
            self.post("/api/sessions/create", request).await?;
        Ok(resp.session)
    }

    async fn list_sessions(
        &self,
        search: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        let mut request = self.client.get(self.url("/api/sessions/list"));
        if let Some(search) = search {
            request = request.query(&[("search", search)]);
        }
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let resp: SessionListResponse = self.send("/api/sessions/list", request).await?;
        Ok(resp.sessions)
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionDetail, BackendError> {
        let resp: SessionEnvelope<SessionDetail> =
            self.get(&format!("/api/sessions/{session_id}")).await?;
        Ok(resp.session)
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        let resp: MessagesResponse = self
            .get(&format!("/api/sessions/{session_id}/messages"))
            .await?;
        Ok(resp.messages)
    }

    async fn create_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<Vec<Message>, BackendError> {
        let resp: MessagesResponse = self
            .post(
                &format!("/api/sessions/{session_id}/messages/create"),
                &json!({ "type": "user", "content": content }),
            )
            .await?;
        Ok(resp.messages)
    }

    async fn questions(&self, session_id: &str) -> Result<QuestionSet, BackendError> {
        self.get(&format!("/api/ambiguity/questions/{session_id}"))
            .await
    }

    async fn answer(
        &self,
        session_id: &str,
        answers: &[String],
    ) -> Result<AnswerOutcome, BackendError> {
        let body = match answers {
            [single] => json!({ "answer": single }),
            many => json!({ "answers": many }),
        };
        let resp: AnswerResponse = self
            .post(&format!("/api/ambiguity/answer/{session_id}"), &body)
            .await?;
        Ok(resp.into())
    }

    async fn continue_resolving(
        &self,
        session_id: &str,
    ) -> Result<ResolutionContinued, BackendError> {
        self.post(
            &format!("/api/ambiguity/resolve/{session_id}"),
            &json!({ "action": "continue_resolving" }),
        )
        .await
    }

    async fn context(&self, session_id: &str) -> Result<Document, BackendError> {
        self.get(&format!("/api/ambiguity/context/{session_id}"))
            .await
    }

    async fn confirm_context(&self, session_id: &str) -> Result<(), BackendError> {
        let _: IgnoredAny = self
            .post(
                &format!("/api/ambiguity/context/{session_id}"),
                &json!({ "confirmed": true }),
            )
            .await?;
        Ok(())
    }

    async fn start_processing(
        &self,
        session_id: &str,
        config: &ProcessingConfig,
    ) -> Result<ProcessingStarted, BackendError> {
        self.post(
            &format!("/api/processing/start/{session_id}"),
            &json!({ "config": config }),
        )
        .await
    }

    async fn processing_status(
        &self,
        session_id: &str,
    ) -> Result<ProcessingSnapshot, BackendError> {
        self.get(&format!("/api/processing/status/{session_id}"))
            .await
    }

    async fn processing_logs(
        &self,
        session_id: &str,
    ) -> Result<Vec<ProcessingLog>, BackendError> {
        let resp: LogsResponse = self
            .get(&format!("/api/processing/logs/{session_id}"))
            .await?;
        Ok(resp.logs)
    }

    async fn stop_processing(&self, session_id: &str) -> Result<(), BackendError> {
        let _: IgnoredAny = self
            .post(&format!("/api/processing/stop/{session_id}"), &json!({}))
            .await?;
        Ok(())
    }

    async fn complete_processing(&self, session_id: &str) -> Result<(), BackendError> {
        let _: IgnoredAny = self
            .post(&format!("/api/processing/complete/{session_id}"), &json!({}))
            .await?;
        Ok(())
    }

    async fn results(&self, session_id: &str) -> Result<Document, BackendError> {
        self.get(&format!("/api/results/{session_id}")).await
    }

    async fn verify_results(&self, session_id: &str) -> Result<Document, BackendError> {
        self.post(&format!("/api/results/{session_id}/verify"), &json!({}))
            .await
    }

    async fn create_share(&self, request: &ShareRequest) -> Result<Document, BackendError> {
        self.post("/api/share/create", request).await
    }

    async fn get_share(&self, token: &str) -> Result<Document, BackendError> {
        self.get(&format!("/api/share/{token}")).await
    }

    async fn revoke_share(&self, token: &str) -> Result<(), BackendError> {
        let _: IgnoredAny = self.delete(&format!("/api/share/{token}")).await?;
        Ok(())
    }

    async fn domains(&self) -> Result<Document, BackendError> {
        self.get("/api/config/domains").await
    }

    async fn models(&self) -> Result<Document, BackendError> {
        self.get("/api/config/models").await
    }

    /// Health is the one endpoint answered without an envelope
    async fn health(&self) -> Result<Document, BackendError> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(BackendError::from_envelope(
                status,
                None,
                format!("Health check returned {status}"),
            ));
        }
        Ok(response.json().await?)
    }
}
