//! Session runtime executor

use super::polling::PollHandle;
use super::{SessionView, SseEvent};

use crate::backend::{AnalyticsBackend, BackendError, ErrorKind, Step};
use crate::config::PollConfig;
use crate::session::{Message, MessageStatus, MessageType, Transcript};
use crate::state_machine::{
    transition, BackendRequest, ConvContext, ConvState, Effect, Event, SessionSnapshot,
    TransitionError,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Actor owning one session's state. Everything else talks to it through
/// its event inbox and listens on its broadcast channel.
pub struct SessionRuntime<B>
where
    B: AnalyticsBackend + ?Sized + 'static,
{
    context: ConvContext,
    state: ConvState,
    transcript: Transcript,
    backend: Arc<B>,
    polling: PollConfig,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    view_tx: watch::Sender<SessionView>,
    /// Parent of every in-flight backend request. Replaced on
    /// `CancelRequests` so late responses are dropped.
    request_token: CancellationToken,
    poller: Option<PollHandle>,
}

impl<B> SessionRuntime<B>
where
    B: AnalyticsBackend + ?Sized + 'static,
{
    pub fn new(
        context: ConvContext,
        backend: Arc<B>,
        polling: PollConfig,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        view_tx: watch::Sender<SessionView>,
    ) -> Self {
        Self {
            context,
            state: ConvState::default(),
            transcript: Transcript::default(),
            backend,
            polling,
            event_rx,
            event_tx,
            broadcast_tx,
            view_tx,
            request_token: CancellationToken::new(),
            poller: None,
        }
    }

    /// Seed state from a freshly loaded snapshot before the loop starts, so
    /// the first published view already reflects the backend.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: SessionSnapshot) -> Self {
        if let Err(e) = self.process_event(Event::SessionLoaded(Box::new(snapshot))) {
            tracing::error!(
                session_id = %self.context.session_id,
                error = %e,
                "Failed to apply session snapshot"
            );
        }
        self
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");

        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event) {
                        tracing::debug!(session_id = %self.context.session_id, error = %e, "Event rejected");
                    }
                }
                else => break,
            }
        }

        self.poller = None;
        self.request_token.cancel();
        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        let event_name = event.name();

        let result = match transition(&self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                // Transition errors are user-facing (e.g. "still waiting")
                let _ = self.broadcast_tx.send(SseEvent::Error {
                    message: e.to_string(),
                });
                if e.requires_resync() {
                    tracing::warn!(
                        session_id = %self.context.session_id,
                        error = %e,
                        "Backend response inconsistent, re-syncing session"
                    );
                    self.execute_effect(Effect::LoadSession);
                }
                return Err(e);
            }
        };

        let old_state = std::mem::replace(&mut self.state, result.new_state);
        if old_state.name() != self.state.name() {
            tracing::debug!(
                session_id = %self.context.session_id,
                from = old_state.name(),
                to = self.state.name(),
                event = event_name,
                "State transition"
            );
        }

        for effect in result.effects {
            self.execute_effect(effect);
        }

        self.view_tx.send_replace(self.view());
        Ok(())
    }

    fn view(&self) -> SessionView {
        SessionView {
            session_id: self.context.session_id.clone(),
            step: self.state.step(),
            awaiting_response: self.state.is_awaiting_response(),
            state: self.state.clone(),
            messages: self.transcript.messages().to_vec(),
        }
    }

    /// Execute an effect. Backend calls run in the background and report
    /// back through the inbox.
    #[allow(clippy::too_many_lines)] // One arm per effect
    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CreateMessage { text } => {
                self.spawn_request(BackendRequest::CreateMessage, move |backend, id| async move {
                    backend
                        .create_message(&id, &text)
                        .await
                        .map(|messages| Event::MessagesCreated { messages })
                });
            }

            Effect::SubmitAnswers { answers } => {
                self.spawn_request(BackendRequest::SubmitAnswers, move |backend, id| async move {
                    backend.answer(&id, &answers).await.map(Event::AnswerRecorded)
                });
            }

            Effect::FetchQuestions => {
                self.spawn_request(BackendRequest::FetchQuestions, |backend, id| async move {
                    backend.questions(&id).await.map(Event::QuestionsFetched)
                });
            }

            Effect::ConfirmContext => {
                self.spawn_request(BackendRequest::ConfirmContext, |backend, id| async move {
                    backend
                        .confirm_context(&id)
                        .await
                        .map(|()| Event::ContextConfirmed)
                });
            }

            Effect::ContinueResolving => {
                self.spawn_request(BackendRequest::ContinueResolving, |backend, id| async move {
                    backend
                        .continue_resolving(&id)
                        .await
                        .map(Event::ResolutionContinued)
                });
            }

            Effect::StartProcessing { config } => {
                self.spawn_request(BackendRequest::StartProcessing, move |backend, id| async move {
                    backend
                        .start_processing(&id, &config)
                        .await
                        .map(Event::ProcessingStarted)
                });
            }

            Effect::StopProcessing => {
                self.spawn_request(BackendRequest::StopProcessing, |backend, id| async move {
                    backend
                        .stop_processing(&id)
                        .await
                        .map(|()| Event::ProcessingStopped)
                });
            }

            Effect::CompleteProcessing => {
                self.spawn_request(BackendRequest::CompleteProcessing, |backend, id| async move {
                    backend
                        .complete_processing(&id)
                        .await
                        .map(|()| Event::ProcessingCompleted)
                });
            }

            Effect::RefreshMessages => {
                self.spawn_request(BackendRequest::RefreshMessages, |backend, id| async move {
                    backend
                        .messages(&id)
                        .await
                        .map(|messages| Event::MessagesRefreshed { messages })
                });
            }

            Effect::LoadSession => {
                self.spawn_request(BackendRequest::LoadSession, |backend, id| async move {
                    load_snapshot(&*backend, &id)
                        .await
                        .map(|snapshot| Event::SessionLoaded(Box::new(snapshot)))
                });
            }

            Effect::CancelRequests => {
                tracing::info!(session_id = %self.context.session_id, "Cancelling in-flight requests");
                let stale = std::mem::take(&mut self.request_token);
                stale.cancel();
            }

            Effect::StartPolling => {
                // Replacing the handle stops the previous pollers
                self.poller = Some(PollHandle::spawn(
                    self.backend.clone(),
                    &self.context.session_id,
                    &self.polling,
                    self.event_tx.clone(),
                ));
            }

            Effect::StopPolling => {
                if self.poller.take().is_some() {
                    tracing::debug!(session_id = %self.context.session_id, "Pollers stopped");
                }
            }

            Effect::AppendMessages(messages) => {
                for message in messages {
                    self.broadcast_message(&message);
                    self.transcript.append(message);
                }
            }

            Effect::AppendLocalMessage {
                message_type,
                content,
            } => {
                let message =
                    Message::local(message_type, content).with_status(MessageStatus::Active);
                self.broadcast_message(&message);
                self.transcript.append(message);
            }

            Effect::ReplaceTranscript(messages) => {
                self.transcript = Transcript::new(messages);
                let session = serde_json::to_value(self.view()).unwrap_or(Value::Null);
                let _ = self.broadcast_tx.send(SseEvent::Init { session });
            }

            Effect::UpdateAmbiguity(update) => {
                if let Some(message) = self.transcript.update_ambiguity(&update) {
                    let message = serde_json::to_value(message).unwrap_or(Value::Null);
                    let _ = self.broadcast_tx.send(SseEvent::Message { message });
                }
            }

            Effect::CloseAmbiguity => {
                if self.transcript.close_ambiguity() {
                    let closed = self
                        .transcript
                        .messages()
                        .iter()
                        .rev()
                        .find(|m| m.message_type == MessageType::Ambiguity)
                        .cloned();
                    if let Some(message) = closed {
                        self.broadcast_message(&message);
                    }
                }
            }

            Effect::PublishState => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    state = self.state.name(),
                    "Session state changed"
                );
                let state = serde_json::to_value(&self.state).unwrap_or(Value::Null);
                let _ = self.broadcast_tx.send(SseEvent::StateChange {
                    step: self.state.step(),
                    awaiting_response: self.state.is_awaiting_response(),
                    state,
                });
            }

            Effect::NotifyProgress(snapshot) => {
                let _ = self.broadcast_tx.send(SseEvent::Stages { snapshot });
            }

            Effect::NotifyLogs(logs) => {
                let _ = self.broadcast_tx.send(SseEvent::Logs { logs });
            }

            Effect::NotifyError { message } => {
                tracing::warn!(session_id = %self.context.session_id, %message, "Session error");
                let _ = self.broadcast_tx.send(SseEvent::Error { message });
            }

            Effect::NotifyAuthRequired => {
                tracing::warn!(session_id = %self.context.session_id, "Backend requires login");
                let _ = self.broadcast_tx.send(SseEvent::AuthRequired);
            }
        }
    }

    fn broadcast_message(&self, message: &Message) {
        let message = serde_json::to_value(message).unwrap_or(Value::Null);
        let _ = self.broadcast_tx.send(SseEvent::Message { message });
    }

    /// Run a backend call in the background and feed its outcome back as an
    /// event, unless the request is cancelled first.
    fn spawn_request<F, Fut>(&self, request: BackendRequest, call: F)
    where
        F: FnOnce(Arc<B>, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Event, BackendError>> + Send + 'static,
    {
        let backend = self.backend.clone();
        let session_id = self.context.session_id.clone();
        let event_tx = self.event_tx.clone();
        let token = self.request_token.child_token();

        tokio::spawn(async move {
            tracing::debug!(session_id = %session_id, ?request, "Backend request (background)");

            let event = tokio::select! {
                biased;

                () = token.cancelled() => {
                    tracing::debug!(session_id = %session_id, ?request, "Backend request cancelled");
                    return;
                }

                result = call(backend, session_id.clone()) => match result {
                    Ok(event) => event,
                    Err(error) => {
                        tracing::warn!(
                            session_id = %session_id,
                            ?request,
                            kind = ?error.kind,
                            error = %error,
                            "Backend request failed"
                        );
                        Event::RequestFailed { request, error }
                    }
                },
            };

            // A response that raced a cancellation is dropped too
            if !token.is_cancelled() {
                let _ = event_tx.send(event).await;
            }
        });
    }
}

/// Fetch everything needed to rebuild a session's state.
///
/// Questions and processing status are optional on the backend side; a 404
/// for either just means the session never got that far.
pub async fn load_snapshot<B>(
    backend: &B,
    session_id: &str,
) -> Result<SessionSnapshot, BackendError>
where
    B: AnalyticsBackend + ?Sized,
{
    let detail = backend.get_session(session_id).await?;
    let step = detail.summary.current_step;

    let questions = if step == Step::Query {
        None
    } else {
        optional(backend.questions(session_id).await)?
    };
    let processing = if step == Step::Processing {
        optional(backend.processing_status(session_id).await)?
    } else {
        None
    };

    Ok(SessionSnapshot {
        detail,
        questions,
        processing,
    })
}

fn optional<T>(result: Result<T, BackendError>) -> Result<Option<T>, BackendError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
