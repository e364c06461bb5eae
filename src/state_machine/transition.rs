//! Pure state transition function
//!
//! Given the same state and event this always produces the same result.
//! All I/O is expressed as [`Effect`]s for the runtime to carry out, and
//! the backend's reported status is the only input that moves a session
//! between steps. Nothing is inferred from missing fields.

use super::event::{BackendRequest, PollSource, SessionSnapshot};
use super::ledger::AmbiguityLedger;
use super::state::{Outcome, ProcessingProgress, ResumeOrigin};
use super::{ConvContext, ConvState, Effect, Event};
use crate::backend::{AmbiguityStatus, AnswerOutcome, BackendError, SessionStatus, Step};
use crate::session::{MessageStatus, MessageType};
use thiserror::Error;

const PROCESSING_MESSAGE: &str = "Analysis started. Stage progress and logs will follow.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Still waiting for the backend to respond")]
    AwaitingResponse,
    #[error("Ambiguity resolution is closed once analysis has started")]
    AmbiguityClosed,
    #[error("Input is empty")]
    EmptyInput,
    #[error("Backend response is inconsistent: {0}")]
    Inconsistent(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// The session must be re-read from the backend before continuing
    pub fn requires_resync(&self) -> bool {
        matches!(self, TransitionError::Inconsistent(_))
    }
}

/// Pure transition function
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Session sync
        // ============================================================
        (_, Event::Reload) => Ok(TransitionResult::new(state.clone())
            .with_effects([Effect::CancelRequests, Effect::LoadSession])),

        (_, Event::SessionLoaded(snapshot)) => Ok(resume(*snapshot)),

        (_, Event::MessagesRefreshed { messages }) => {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::ReplaceTranscript(messages)))
        }

        // ============================================================
        // Query
        // ============================================================
        (ConvState::Query, Event::UserMessage { text }) => {
            let text = require_text(&text)?;
            Ok(
                TransitionResult::new(ConvState::SubmittingQuery { text: text.clone() })
                    .with_effect(Effect::PublishState)
                    .with_effect(Effect::CreateMessage { text }),
            )
        }

        (ConvState::SubmittingQuery { .. }, Event::MessagesCreated { messages }) => {
            let seeded = messages
                .iter()
                .rev()
                .find(|m| m.is_active_ambiguity())
                .map(AmbiguityLedger::from_message);

            Ok(match seeded {
                Some(ledger) => TransitionResult::new(ConvState::Ambiguity { ledger })
                    .with_effect(Effect::AppendMessages(messages))
                    .with_effect(Effect::PublishState)
                    .with_effect(Effect::FetchQuestions),
                // No clarifying questions; ask the backend where the session went
                None => TransitionResult::new(ConvState::Query)
                    .with_effect(Effect::AppendMessages(messages))
                    .with_effect(Effect::PublishState)
                    .with_effect(Effect::LoadSession),
            })
        }

        // ============================================================
        // Ambiguity Resolution
        // ============================================================
        (ConvState::Ambiguity { ledger }, Event::UserMessage { text }) => {
            let answer = require_text(&text)?;
            Ok(submit_answers(ledger, vec![answer]))
        }

        (ConvState::Ambiguity { ledger }, Event::AnswerQuestions { answers }) => {
            let answers: Vec<String> = answers
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            if answers.is_empty() {
                return Err(TransitionError::EmptyInput);
            }
            Ok(submit_answers(ledger, answers))
        }

        (ConvState::SubmittingAnswers { ledger, pending }, Event::AnswerRecorded(outcome)) => {
            record_answers(ledger, pending, outcome)
        }

        (ConvState::Ambiguity { ledger }, Event::QuestionsFetched(set)) => {
            let mut ledger = ledger.clone();
            ledger.reconcile(&set);
            let next = match set.status {
                AmbiguityStatus::ContextConfirmation => ConvState::Context {
                    ledger,
                    confirmed: false,
                },
                AmbiguityStatus::Confirmed => ConvState::Context {
                    ledger,
                    confirmed: true,
                },
                AmbiguityStatus::Active | AmbiguityStatus::Completed => {
                    ConvState::Ambiguity { ledger }
                }
            };
            Ok(TransitionResult::new(next).with_effect(Effect::PublishState))
        }

        (ConvState::Context { ledger, confirmed }, Event::QuestionsFetched(set)) => {
            let mut ledger = ledger.clone();
            ledger.reconcile(&set);
            Ok(TransitionResult::new(ConvState::Context {
                ledger,
                confirmed: *confirmed || set.status == AmbiguityStatus::Confirmed,
            })
            .with_effect(Effect::PublishState))
        }

        // ============================================================
        // Context Confirmation
        // ============================================================
        (ConvState::Context { ledger, .. }, Event::ConfirmContext) => Ok(TransitionResult::new(
            ConvState::ConfirmingContext {
                ledger: ledger.clone(),
            },
        )
        .with_effect(Effect::PublishState)
        .with_effect(Effect::ConfirmContext)),

        (ConvState::ConfirmingContext { ledger }, Event::ContextConfirmed) => {
            Ok(TransitionResult::new(ConvState::Context {
                ledger: ledger.clone(),
                confirmed: true,
            })
            .with_effect(Effect::PublishState))
        }

        (ConvState::Context { ledger, confirmed }, Event::ContinueResolving) => Ok(
            resume_resolution(ledger, ResumeOrigin::Context { confirmed: *confirmed }),
        ),

        (ConvState::Completed { ledger, outcome }, Event::ContinueResolving) => {
            Ok(resume_resolution(
                ledger,
                ResumeOrigin::Completed {
                    outcome: outcome.clone(),
                },
            ))
        }

        (ConvState::ResumingResolution { ledger, .. }, Event::ResolutionContinued(resumed)) => {
            let mut ledger = ledger.clone();
            ledger.set_current_question(Some(resumed.current_question.clone()));
            Ok(TransitionResult::new(ConvState::Ambiguity { ledger })
                .with_effect(Effect::update_ambiguity(
                    MessageStatus::Active,
                    Some(resumed.current_question),
                    resumed.answered_questions,
                    resumed.total_questions,
                ))
                .with_effect(Effect::PublishState)
                .with_effect(Effect::FetchQuestions))
        }

        // Starting analysis always enters processing; the backend's
        // acknowledgement only flips `started`.
        (ConvState::Context { ledger, .. }, Event::StartAnalysis { config }) => {
            Ok(TransitionResult::new(ConvState::Processing {
                ledger: ledger.clone(),
                progress: ProcessingProgress::default(),
                started: false,
            })
            .with_effect(Effect::CloseAmbiguity)
            .with_effect(Effect::AppendLocalMessage {
                message_type: MessageType::Processing,
                content: PROCESSING_MESSAGE.to_string(),
            })
            .with_effect(Effect::PublishState)
            .with_effect(Effect::StartProcessing {
                config: config.normalized(),
            }))
        }

        // ============================================================
        // Processing
        // ============================================================
        (
            ConvState::Processing {
                ledger,
                progress,
                started: false,
            },
            Event::ProcessingStarted(_),
        ) => Ok(TransitionResult::new(ConvState::Processing {
            ledger: ledger.clone(),
            progress: progress.clone(),
            started: true,
        })
        .with_effect(Effect::PublishState)
        .with_effect(Effect::StartPolling)),

        (
            ConvState::Processing {
                ledger,
                started: false,
                ..
            },
            Event::RequestFailed {
                request: BackendRequest::StartProcessing,
                error,
            },
        ) => Ok(TransitionResult::new(ConvState::Context {
            ledger: ledger.clone(),
            confirmed: false,
        })
        .with_effect(Effect::PublishState)
        .with_effect(Effect::notify_error(format!(
            "Failed to start analysis: {error}"
        )))
        .with_effects(auth_effects(&error))),

        (
            ConvState::Processing {
                ledger,
                progress,
                started,
            },
            Event::StatusPolled(snapshot),
        ) => {
            let mut progress = progress.clone();
            progress.apply(&snapshot);
            let notify = Effect::NotifyProgress(snapshot.clone());

            Ok(match Outcome::from_run(&snapshot) {
                Some(outcome) => TransitionResult::new(ConvState::Completed {
                    ledger: ledger.clone(),
                    outcome,
                })
                .with_effect(Effect::StopPolling)
                .with_effect(notify)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::RefreshMessages),
                None => TransitionResult::new(ConvState::Processing {
                    ledger: ledger.clone(),
                    progress,
                    started: *started,
                })
                .with_effect(notify),
            })
        }

        (
            ConvState::Processing {
                ledger,
                progress,
                started,
            },
            Event::LogsPolled(logs),
        ) => {
            let mut progress = progress.clone();
            let fresh = progress.merge_logs(logs);
            let result = TransitionResult::new(ConvState::Processing {
                ledger: ledger.clone(),
                progress,
                started: *started,
            });
            Ok(if fresh.is_empty() {
                result
            } else {
                result.with_effect(Effect::NotifyLogs(fresh))
            })
        }

        (
            ConvState::Processing {
                ledger,
                progress,
                started,
            },
            Event::PollFailed { source, error },
        ) => Ok(poll_failed(
            context, ledger, progress, *started, source, &error,
        )),

        // Before the start is acknowledged the backend may reject the stop,
        // so the start request is left to land and be stopped again
        (ConvState::Processing { ledger, started, .. }, Event::ForceStop) => {
            Ok(TransitionResult::new(ConvState::Completed {
                ledger: ledger.clone(),
                outcome: Outcome::Stopped,
            })
            .with_effect(Effect::StopPolling)
            .with_effects((*started).then_some(Effect::CancelRequests))
            .with_effect(Effect::PublishState)
            .with_effect(Effect::StopProcessing))
        }

        (ConvState::Processing { ledger, .. }, Event::FinishProcessing) => {
            Ok(TransitionResult::new(ConvState::Completed {
                ledger: ledger.clone(),
                outcome: Outcome::Succeeded,
            })
            .with_effect(Effect::StopPolling)
            .with_effect(Effect::PublishState)
            .with_effect(Effect::CompleteProcessing))
        }

        (
            ConvState::Processing { .. } | ConvState::Recovering { .. },
            Event::UserMessage { .. }
            | Event::AnswerQuestions { .. }
            | Event::ConfirmContext
            | Event::ContinueResolving,
        ) => Err(TransitionError::AmbiguityClosed),

        // ============================================================
        // Recovery
        // ============================================================
        (ConvState::Recovering { ledger, .. }, Event::ForceStop) => {
            Ok(TransitionResult::new(ConvState::Completed {
                ledger: ledger.clone(),
                outcome: Outcome::Stopped,
            })
            .with_effect(Effect::CancelRequests)
            .with_effect(Effect::StopPolling)
            .with_effect(Effect::PublishState)
            .with_effect(Effect::StopProcessing))
        }

        (
            ConvState::Recovering { ledger, .. },
            Event::RequestFailed {
                request: BackendRequest::LoadSession,
                error,
            },
        ) => Ok(TransitionResult::new(ConvState::Completed {
            ledger: ledger.clone(),
            outcome: Outcome::Abandoned {
                reason: error.to_string(),
            },
        })
        .with_effect(Effect::PublishState)
        .with_effect(Effect::notify_error(format!(
            "Lost contact with the analysis: {error}"
        )))
        .with_effects(auth_effects(&error))),

        // ============================================================
        // Completed
        // ============================================================
        (ConvState::Completed { .. }, Event::ForceStop) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::StopPolling))
        }

        (ConvState::Completed { .. }, Event::ProcessingStopped | Event::ProcessingCompleted) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::RefreshMessages))
        }

        // A start acknowledged after the user already stopped the run
        (
            ConvState::Completed {
                outcome: Outcome::Stopped,
                ..
            },
            Event::ProcessingStarted(_),
        ) => Ok(TransitionResult::new(state.clone()).with_effect(Effect::StopProcessing)),

        (
            ConvState::Completed {
                outcome: Outcome::Stopped,
                ..
            },
            Event::RequestFailed {
                request: BackendRequest::StartProcessing,
                error,
            },
        ) => Ok(TransitionResult::new(state.clone()).with_effects(auth_effects(&error))),

        (ConvState::Completed { ledger, outcome }, Event::UserMessage { text }) => {
            let text = require_text(&text)?;
            Ok(TransitionResult::new(ConvState::SubmittingFollowUp {
                ledger: ledger.clone(),
                outcome: outcome.clone(),
                text: text.clone(),
            })
            .with_effect(Effect::PublishState)
            .with_effect(Effect::CreateMessage { text }))
        }

        (
            ConvState::SubmittingFollowUp {
                ledger, outcome, ..
            },
            Event::MessagesCreated { messages },
        ) => Ok(TransitionResult::new(ConvState::Completed {
            ledger: ledger.clone(),
            outcome: outcome.clone(),
        })
        .with_effect(Effect::AppendMessages(messages))
        .with_effect(Effect::PublishState)),

        // ============================================================
        // Failures and fallbacks
        // ============================================================
        (_, Event::RequestFailed { request, error }) => Ok(request_failed(state, request, &error)),

        (state, event) if event.is_user_event() => {
            if state.is_awaiting_response() {
                Err(TransitionError::AwaitingResponse)
            } else {
                Err(TransitionError::InvalidTransition(format!(
                    "{} is not accepted in the {} state",
                    event.name(),
                    state.name()
                )))
            }
        }

        // Stale backend event: a response or poll that outlived the state
        // it was meant for
        (state, _) => Ok(TransitionResult::new(state.clone())),
    }
}

// ============================================================
// Helpers
// ============================================================

fn require_text(text: &str) -> Result<String, TransitionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(TransitionError::EmptyInput)
    } else {
        Ok(trimmed.to_string())
    }
}

fn submit_answers(ledger: &AmbiguityLedger, answers: Vec<String>) -> TransitionResult {
    TransitionResult::new(ConvState::SubmittingAnswers {
        ledger: ledger.clone(),
        pending: answers.clone(),
    })
    .with_effect(Effect::PublishState)
    .with_effect(Effect::SubmitAnswers { answers })
}

fn record_answers(
    ledger: &AmbiguityLedger,
    pending: &[String],
    outcome: AnswerOutcome,
) -> Result<TransitionResult, TransitionError> {
    let mut ledger = ledger.clone();
    ledger.record(pending.iter().cloned());

    match outcome {
        AnswerOutcome::Active {
            next_question,
            answered,
            total,
        } => {
            let in_sync = ledger.matches(answered, total);
            ledger.set_current_question(Some(next_question.clone()));
            let result = TransitionResult::new(ConvState::Ambiguity { ledger })
                .with_effect(Effect::update_ambiguity(
                    MessageStatus::Active,
                    Some(next_question),
                    answered,
                    total,
                ))
                .with_effect(Effect::PublishState);
            Ok(if in_sync {
                result
            } else {
                result.with_effect(Effect::FetchQuestions)
            })
        }
        AnswerOutcome::ContextConfirmation { total_answered } => {
            ledger.set_current_question(None);
            let in_sync = ledger.is_complete() && ledger.answers().len() == total_answered;
            let update = Effect::update_ambiguity(
                MessageStatus::ContextConfirmation,
                None,
                ledger.answers().len(),
                ledger.questions().len(),
            );
            let result = TransitionResult::new(ConvState::Context {
                ledger,
                confirmed: false,
            })
            .with_effect(update)
            .with_effect(Effect::PublishState);
            Ok(if in_sync {
                result
            } else {
                result.with_effect(Effect::FetchQuestions)
            })
        }
        AnswerOutcome::Unrecognized { reported } => Err(TransitionError::Inconsistent(format!(
            "answer response reported status {} without a next question",
            reported.as_deref().unwrap_or("<none>")
        ))),
    }
}

fn resume_resolution(ledger: &AmbiguityLedger, origin: ResumeOrigin) -> TransitionResult {
    TransitionResult::new(ConvState::ResumingResolution {
        ledger: ledger.clone(),
        origin,
    })
    .with_effect(Effect::PublishState)
    .with_effect(Effect::ContinueResolving)
}

fn poll_failed(
    context: &ConvContext,
    ledger: &AmbiguityLedger,
    progress: &ProcessingProgress,
    started: bool,
    source: PollSource,
    error: &BackendError,
) -> TransitionResult {
    let mut progress = progress.clone();
    let failures = progress.record_failure(source);

    if error.is_auth() {
        return TransitionResult::new(ConvState::Processing {
            ledger: ledger.clone(),
            progress,
            started,
        })
        .with_effect(Effect::StopPolling)
        .with_effects(auth_effects(error));
    }

    if failures < context.max_poll_failures {
        return TransitionResult::new(ConvState::Processing {
            ledger: ledger.clone(),
            progress,
            started,
        });
    }

    let source = match source {
        PollSource::Status => "status",
        PollSource::Logs => "log",
    };
    TransitionResult::new(ConvState::Recovering {
        ledger: ledger.clone(),
        progress,
    })
    .with_effect(Effect::StopPolling)
    .with_effect(Effect::PublishState)
    .with_effect(Effect::notify_error(format!(
        "Processing {source} polling keeps failing ({error}); re-fetching session"
    )))
    .with_effect(Effect::LoadSession)
}

fn auth_effects(error: &BackendError) -> Option<Effect> {
    error.is_auth().then_some(Effect::NotifyAuthRequired)
}

/// The backend request an awaiting state is blocked on
fn awaited_request(state: &ConvState) -> Option<BackendRequest> {
    match state {
        ConvState::SubmittingQuery { .. } | ConvState::SubmittingFollowUp { .. } => {
            Some(BackendRequest::CreateMessage)
        }
        ConvState::SubmittingAnswers { .. } => Some(BackendRequest::SubmitAnswers),
        ConvState::ConfirmingContext { .. } => Some(BackendRequest::ConfirmContext),
        ConvState::ResumingResolution { .. } => Some(BackendRequest::ContinueResolving),
        ConvState::Recovering { .. } => Some(BackendRequest::LoadSession),
        _ => None,
    }
}

/// Where an awaiting state returns to when its request fails
fn origin_state(state: &ConvState) -> Option<ConvState> {
    match state {
        ConvState::SubmittingQuery { .. } => Some(ConvState::Query),
        ConvState::SubmittingAnswers { ledger, .. } => Some(ConvState::Ambiguity {
            ledger: ledger.clone(),
        }),
        ConvState::ConfirmingContext { ledger } => Some(ConvState::Context {
            ledger: ledger.clone(),
            confirmed: false,
        }),
        ConvState::ResumingResolution { ledger, origin } => Some(match origin {
            ResumeOrigin::Context { confirmed } => ConvState::Context {
                ledger: ledger.clone(),
                confirmed: *confirmed,
            },
            ResumeOrigin::Completed { outcome } => ConvState::Completed {
                ledger: ledger.clone(),
                outcome: outcome.clone(),
            },
        }),
        ConvState::SubmittingFollowUp {
            ledger, outcome, ..
        } => Some(ConvState::Completed {
            ledger: ledger.clone(),
            outcome: outcome.clone(),
        }),
        _ => None,
    }
}

fn request_failed(
    state: &ConvState,
    request: BackendRequest,
    error: &BackendError,
) -> TransitionResult {
    let notify = Effect::notify_error(format!("{} failed: {error}", request_label(request)));

    // A failed resync also unblocks whatever the session was waiting on
    let unblocks = awaited_request(state) == Some(request)
        || (request == BackendRequest::LoadSession && state.is_awaiting_response());

    match origin_state(state).filter(|_| unblocks) {
        Some(origin) => TransitionResult::new(origin).with_effect(Effect::PublishState),
        None => TransitionResult::new(state.clone()),
    }
    .with_effect(notify)
    .with_effects(auth_effects(error))
}

fn request_label(request: BackendRequest) -> &'static str {
    match request {
        BackendRequest::CreateMessage => "Sending message",
        BackendRequest::SubmitAnswers => "Submitting answers",
        BackendRequest::FetchQuestions => "Fetching questions",
        BackendRequest::ConfirmContext => "Confirming context",
        BackendRequest::ContinueResolving => "Continuing resolution",
        BackendRequest::StartProcessing => "Starting analysis",
        BackendRequest::StopProcessing => "Stopping analysis",
        BackendRequest::CompleteProcessing => "Completing analysis",
        BackendRequest::RefreshMessages => "Refreshing messages",
        BackendRequest::LoadSession => "Loading session",
    }
}

/// Rebuild state from a backend snapshot
fn resume(snapshot: SessionSnapshot) -> TransitionResult {
    let SessionSnapshot {
        detail,
        questions,
        processing,
    } = snapshot;

    let mut ledger = questions
        .as_ref()
        .map(AmbiguityLedger::from_backend)
        .unwrap_or_default();
    let confirmed = questions
        .as_ref()
        .is_some_and(|q| q.status == AmbiguityStatus::Confirmed);

    let state = match detail.summary.current_step {
        Step::Query => ConvState::Query,
        Step::Ambiguity => {
            if ledger.current_question().is_none() {
                let asked = detail
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.is_active_ambiguity())
                    .and_then(|m| m.current_question.clone());
                ledger.set_current_question(asked);
            }
            ConvState::Ambiguity { ledger }
        }
        Step::Context => ConvState::Context { ledger, confirmed },
        Step::Processing => match processing {
            Some(run) => match Outcome::from_run(&run) {
                Some(outcome) => ConvState::Completed { ledger, outcome },
                None => ConvState::Processing {
                    ledger,
                    progress: ProcessingProgress::from_snapshot(&run),
                    started: true,
                },
            },
            None => ConvState::Completed {
                ledger,
                outcome: Outcome::Abandoned {
                    reason: "Session is processing but the backend has no processing run"
                        .to_string(),
                },
            },
        },
        Step::Completed => ConvState::Completed {
            ledger,
            outcome: if detail.summary.status == SessionStatus::Stopped {
                Outcome::Stopped
            } else {
                Outcome::Succeeded
            },
        },
    };

    let polling = if state.is_polling() {
        Effect::StartPolling
    } else {
        Effect::StopPolling
    };

    TransitionResult::new(state)
        .with_effect(Effect::ReplaceTranscript(detail.messages))
        .with_effect(polling)
        .with_effect(Effect::PublishState)
}
