//! Session runtimes and the session store
//!
//! One [`SessionRuntime`] actor runs per opened session. The
//! [`RuntimeManager`] creates them on demand, tracks the known sessions and
//! which one is active, and routes events to them.

mod executor;
pub mod polling;


pub use executor::{load_snapshot, SessionRuntime};

use crate::backend::{
    AnalyticsBackend, BackendError, CreateSessionRequest, ProcessingLog, ProcessingSnapshot,
    SessionSummary, Step,
};
use crate::config::PollConfig;
use crate::session::Message;
use crate::state_machine::{transition, ConvContext, ConvState, Event, TransitionError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

/// Production runtime, backed by whatever backend the manager was built with
pub type ProductionRuntime = SessionRuntime<dyn AnalyticsBackend>;

/// Latest published view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub step: Step,
    pub awaiting_response: bool,
    pub state: ConvState,
    pub messages: Vec<Message>,
}

impl SessionView {
    fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            step: Step::Query,
            awaiting_response: false,
            state: ConvState::default(),
            messages: Vec::new(),
        }
    }
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    /// Full session view; sent on connect and whenever the transcript is
    /// rebuilt from the backend
    Init {
        session: serde_json::Value,
    },
    StateChange {
        step: Step,
        awaiting_response: bool,
        /// Full state as JSON object (e.g. `{"type":"context","confirmed":false,...}`)
        state: serde_json::Value,
    },
    Message {
        message: serde_json::Value,
    },
    Stages {
        snapshot: ProcessingSnapshot,
    },
    Logs {
        logs: Vec<ProcessingLog>,
    },
    AuthRequired,
    Error {
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Session runtime for {0} has stopped")]
    Stopped(String),
}

/// Handle to interact with a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    pub view_rx: watch::Receiver<SessionView>,
    pub context: ConvContext,
}

impl SessionHandle {
    pub fn view(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }
}

/// Session store: known sessions, the active one, and a runtime per opened
/// session
pub struct RuntimeManager {
    backend: Arc<dyn AnalyticsBackend>,
    polling: PollConfig,
    runtimes: RwLock<HashMap<String, SessionHandle>>,
    sessions: RwLock<Vec<SessionSummary>>,
    active: RwLock<Option<String>>,
}

impl RuntimeManager {
    pub fn new(backend: Arc<dyn AnalyticsBackend>, polling: PollConfig) -> Self {
        Self {
            backend,
            polling,
            runtimes: RwLock::new(HashMap::new()),
            sessions: RwLock::new(Vec::new()),
            active: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AnalyticsBackend> {
        &self.backend
    }

    /// Refresh the session list from the backend.
    ///
    /// While the backend is unreachable the unfiltered list is served from
    /// the last successful refresh.
    pub async fn list_sessions(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<SessionSummary>, BackendError> {
        match self.backend.list_sessions(search, None).await {
            Ok(sessions) => {
                if search.is_none() {
                    *self.sessions.write().await = sessions.clone();
                }
                Ok(sessions)
            }
            Err(e) if search.is_none() && e.kind.is_retryable() => {
                let cached = self.sessions.read().await.clone();
                if cached.is_empty() {
                    return Err(e);
                }
                tracing::warn!(error = %e, count = cached.len(), "Serving cached session list");
                Ok(cached)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a session on the backend and make it the active one
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionSummary, RuntimeError> {
        let summary = self.backend.create_session(request).await?;
        tracing::info!(session_id = %summary.id, title = %summary.title, "Session created");

        self.sessions.write().await.insert(0, summary.clone());
        self.activate(&summary.id).await?;
        Ok(summary)
    }

    /// Make `session_id` the active session.
    ///
    /// A session that was already open is reloaded so anything still in
    /// flight from before is dropped.
    pub async fn activate(&self, session_id: &str) -> Result<SessionView, RuntimeError> {
        let running = self.runtimes.read().await.contains_key(session_id);
        let handle = self.get_or_create(session_id).await?;
        if running {
            handle
                .event_tx
                .send(Event::Reload)
                .await
                .map_err(|_| RuntimeError::Stopped(session_id.to_string()))?;
        }

        let previous = self.active.write().await.replace(session_id.to_string());
        if previous.as_deref() != Some(session_id) {
            tracing::info!(session_id = %session_id, previous = ?previous, "Active session changed");
        }
        Ok(handle.view())
    }

    pub async fn active_session(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Get or create a runtime for a session
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionHandle, BackendError> {
        // Check if already running
        if let Some(handle) = self.runtimes.read().await.get(session_id) {
            return Ok(handle.clone());
        }

        // Load before taking the write lock; an unknown id fails here
        let snapshot = load_snapshot(self.backend.as_ref(), session_id).await?;

        let mut runtimes = self.runtimes.write().await;
        if let Some(handle) = runtimes.get(session_id) {
            return Ok(handle.clone());
        }

        let context = ConvContext::new(session_id, self.polling.max_failures);
        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (view_tx, view_rx) = watch::channel(SessionView::empty(session_id));

        let runtime: ProductionRuntime = SessionRuntime::new(
            context.clone(),
            self.backend.clone(),
            self.polling,
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
            view_tx,
        )
        .with_snapshot(snapshot);

        // Start runtime in background
        let id = session_id.to_string();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %id, "Session runtime finished");
        });

        let handle = SessionHandle {
            event_tx,
            broadcast_tx,
            view_rx,
            context,
        };
        runtimes.insert(session_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Validate a user event against the latest published state, then hand
    /// it to the session's runtime.
    ///
    /// The runtime re-checks on arrival, so a state change in between is
    /// still caught; this only gives the caller an immediate answer.
    pub async fn dispatch(&self, session_id: &str, event: Event) -> Result<(), RuntimeError> {
        let handle = self.get_or_create(session_id).await?;
        {
            let view = handle.view_rx.borrow();
            transition(&view.state, &handle.context, event.clone())?;
        }
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::Stopped(session_id.to_string()))
    }

    /// Subscribe to session updates. The view is read after subscribing so
    /// nothing published in between is lost.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionView, broadcast::Receiver<SseEvent>), BackendError> {
        let handle = self.get_or_create(session_id).await?;
        let rx = handle.broadcast_tx.subscribe();
        Ok((handle.view(), rx))
    }

    pub async fn view(&self, session_id: &str) -> Result<SessionView, BackendError> {
        Ok(self.get_or_create(session_id).await?.view())
    }
}
