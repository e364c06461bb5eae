//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AnswersRequest, HealthResponse, LoginRequest, MessageRequest, QueuedResponse,
    SessionListResponse, SessionResponse, SessionsQuery, ShareRequest, StartRequest,
    SuccessResponse, UserResponse,
};
use super::AppState;
use crate::backend::{
    self, BackendError, CreateSessionRequest, Document, Envelope, ErrorKind, ProcessingConfig,
};
use crate::runtime::{RuntimeError, SessionView, SseEvent};
use crate::state_machine::{Event, TransitionError};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Login proxied to the backend; the cookie stays in this process
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/profile", get(profile))
        // Session store
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/active", get(active_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/activate", post(activate_session))
        .route("/api/sessions/:id/stream", get(stream_session))
        // Wizard actions
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/sessions/:id/answers", post(submit_answers))
        .route("/api/sessions/:id/context", get(get_context))
        .route("/api/sessions/:id/context/confirm", post(confirm_context))
        .route("/api/sessions/:id/continue", post(continue_resolving))
        .route("/api/sessions/:id/start", post(start_analysis))
        .route("/api/sessions/:id/stop", post(stop_analysis))
        .route("/api/sessions/:id/finish", post(finish_analysis))
        .route("/api/sessions/:id/reload", post(reload_session))
        .route("/api/sessions/:id/results", get(get_results))
        .route("/api/sessions/:id/verify", post(verify_results))
        // Sharing
        .route("/api/sessions/:id/share", post(create_share))
        .route("/api/shares/:token", get(get_share).delete(revoke_share))
        // Backend configuration
        .route("/api/config/domains", get(list_domains))
        .route("/api/config/models", get(list_models))
        .with_state(state)
}

type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

// ============================================================
// Health & Auth
// ============================================================

async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let backend = match state.runtime.backend().health().await {
        Ok(report) => report,
        Err(e) => json!({ "status": "unreachable", "error": e.message }),
    };

    ok(HealthResponse {
        status: "healthy",
        service: "analytics-console",
        version: env!("CARGO_PKG_VERSION"),
        backend,
    })
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<UserResponse> {
    let user = state
        .runtime
        .backend()
        .login(&req.email, &req.password)
        .await?;
    tracing::info!(user_id = %user.id, "Logged in to analytics backend");
    ok(UserResponse { user })
}

async fn logout(State(state): State<AppState>) -> ApiResult<SuccessResponse> {
    state.runtime.backend().logout().await?;
    ok(SuccessResponse { success: true })
}

async fn profile(State(state): State<AppState>) -> ApiResult<UserResponse> {
    let user = state.runtime.backend().profile().await?;
    ok(UserResponse { user })
}

// ============================================================
// Session Store
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> ApiResult<SessionListResponse> {
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());
    let sessions = state.runtime.list_sessions(search).await?;
    ok(SessionListResponse {
        total: sessions.len(),
        sessions,
    })
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<SessionResponse<SessionView>> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("Session title is required".to_string()));
    }
    let summary = state.runtime.create_session(&req).await?;
    let view = state.runtime.view(&summary.id).await?;
    ok(SessionResponse { session: view })
}

async fn active_session(
    State(state): State<AppState>,
) -> ApiResult<SessionResponse<Option<SessionView>>> {
    let view = match state.runtime.active_session().await {
        Some(id) => Some(state.runtime.view(&id).await?),
        None => None,
    };
    ok(SessionResponse { session: view })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse<SessionView>> {
    let view = state.runtime.view(&id).await?;
    ok(SessionResponse { session: view })
}

async fn activate_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionResponse<SessionView>> {
    let view = state.runtime.activate(&id).await?;
    ok(SessionResponse { session: view })
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (view, broadcast_rx) = state.runtime.subscribe(&id).await?;
    let session =
        serde_json::to_value(&view).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(sse_stream(SseEvent::Init { session }, broadcast_rx))
}

// ============================================================
// Wizard Actions
// ============================================================

async fn dispatch(state: &AppState, id: &str, event: Event) -> ApiResult<QueuedResponse> {
    state.runtime.dispatch(id, event).await?;
    ok(QueuedResponse { queued: true })
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> ApiResult<QueuedResponse> {
    dispatch(&state, &id, Event::UserMessage { text: req.text }).await
}

async fn submit_answers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AnswersRequest>,
) -> ApiResult<QueuedResponse> {
    dispatch(
        &state,
        &id,
        Event::AnswerQuestions {
            answers: req.answers,
        },
    )
    .await
}

async fn get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    ok(state.runtime.backend().context(&id).await?)
}

async fn confirm_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<QueuedResponse> {
    dispatch(&state, &id, Event::ConfirmContext).await
}

async fn continue_resolving(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<QueuedResponse> {
    dispatch(&state, &id, Event::ContinueResolving).await
}

async fn start_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<QueuedResponse> {
    // No body means the default configuration; a malformed one is rejected
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        ProcessingConfig::default()
    } else {
        serde_json::from_slice::<StartRequest>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid start request: {e}")))?
            .config
    };
    dispatch(&state, &id, Event::StartAnalysis { config }).await
}

async fn stop_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<QueuedResponse> {
    dispatch(&state, &id, Event::ForceStop).await
}

async fn finish_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<QueuedResponse> {
    dispatch(&state, &id, Event::FinishProcessing).await
}

async fn reload_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<QueuedResponse> {
    dispatch(&state, &id, Event::Reload).await
}

async fn get_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    let results = state.runtime.backend().results(&id).await?;
    ok(results)
}

async fn verify_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    ok(state.runtime.backend().verify_results(&id).await?)
}

// ============================================================
// Sharing
// ============================================================

async fn create_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ShareRequest>,
) -> ApiResult<Document> {
    let request = backend::ShareRequest {
        session_id: id,
        access_level: req.access_level,
        emails: req.emails,
    };
    let share = state.runtime.backend().create_share(&request).await?;
    tracing::info!(
        session_id = %request.session_id,
        access_level = ?request.access_level,
        "Share link created"
    );
    ok(share)
}

async fn get_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Document> {
    ok(state.runtime.backend().get_share(&token).await?)
}

async fn revoke_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<SuccessResponse> {
    state.runtime.backend().revoke_share(&token).await?;
    ok(SuccessResponse { success: true })
}

// ============================================================
// Backend Configuration
// ============================================================

async fn list_domains(State(state): State<AppState>) -> ApiResult<Document> {
    ok(state.runtime.backend().domains().await?)
}

async fn list_models(State(state): State<AppState>) -> ApiResult<Document> {
    ok(state.runtime.backend().models().await?)
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Backend(BackendError),
    /// The session's state does not allow the action
    Conflict(TransitionError),
    Internal(String),
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        AppError::Backend(e)
    }
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Backend(e) => AppError::Backend(e),
            RuntimeError::Rejected(TransitionError::EmptyInput) => {
                AppError::BadRequest(TransitionError::EmptyInput.to_string())
            }
            RuntimeError::Rejected(e) => AppError::Conflict(e),
            e @ RuntimeError::Stopped(_) => AppError::Internal(e.to_string()),
        }
    }
}

fn backend_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Server | ErrorKind::Network | ErrorKind::Decode => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, None, msg),
            AppError::Backend(e) => {
                let code = match e.kind {
                    ErrorKind::Auth => Some(e.code.unwrap_or_else(|| "AUTH_REQUIRED".into())),
                    _ => e.code,
                };
                (backend_status(e.kind), code, e.message)
            }
            AppError::Conflict(e) => (
                StatusCode::CONFLICT,
                Some("INVALID_STATE".into()),
                e.to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, None, msg),
        };

        let body = Json(Envelope::<()>::failure(
            status.as_u16(),
            code.as_deref(),
            message,
        ));
        (status, body).into_response()
    }
}
