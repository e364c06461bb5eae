//! Events that drive state transitions

use crate::backend::{
    AnswerOutcome, BackendError, ProcessingConfig, ProcessingLog, ProcessingSnapshot,
    ProcessingStarted, QuestionSet, ResolutionContinued, SessionDetail,
};
use crate::session::Message;
use serde::Serialize;

/// Backend request kinds, used to match failures to the state awaiting them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRequest {
    CreateMessage,
    SubmitAnswers,
    FetchQuestions,
    ConfirmContext,
    ContinueResolving,
    StartProcessing,
    StopProcessing,
    CompleteProcessing,
    RefreshMessages,
    LoadSession,
}

/// Which poller reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollSource {
    Status,
    Logs,
}

/// Everything needed to rebuild a session's state after (re)opening it
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub detail: SessionDetail,
    /// Absent when the session never reached ambiguity resolution
    pub questions: Option<QuestionSet>,
    /// Present only for sessions in the processing step
    pub processing: Option<ProcessingSnapshot>,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },
    /// Batch answers to the outstanding questions
    AnswerQuestions {
        answers: Vec<String>,
    },
    ConfirmContext,
    ContinueResolving,
    StartAnalysis {
        config: ProcessingConfig,
    },
    ForceStop,
    /// Skip the rest of the simulated run
    FinishProcessing,
    Reload,

    // Backend responses
    MessagesCreated {
        messages: Vec<Message>,
    },
    MessagesRefreshed {
        messages: Vec<Message>,
    },
    AnswerRecorded(AnswerOutcome),
    QuestionsFetched(QuestionSet),
    ContextConfirmed,
    ResolutionContinued(ResolutionContinued),
    ProcessingStarted(ProcessingStarted),
    ProcessingStopped,
    ProcessingCompleted,
    SessionLoaded(Box<SessionSnapshot>),
    RequestFailed {
        request: BackendRequest,
        error: BackendError,
    },

    // Pollers
    StatusPolled(ProcessingSnapshot),
    LogsPolled(Vec<ProcessingLog>),
    PollFailed {
        source: PollSource,
        error: BackendError,
    },
}

impl Event {
    /// Events that originate from the user rather than the backend
    pub fn is_user_event(&self) -> bool {
        matches!(
            self,
            Event::UserMessage { .. }
                | Event::AnswerQuestions { .. }
                | Event::ConfirmContext
                | Event::ContinueResolving
                | Event::StartAnalysis { .. }
                | Event::ForceStop
                | Event::FinishProcessing
                | Event::Reload
        )
    }

    /// Short name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::AnswerQuestions { .. } => "answer_questions",
            Event::ConfirmContext => "confirm_context",
            Event::ContinueResolving => "continue_resolving",
            Event::StartAnalysis { .. } => "start_analysis",
            Event::ForceStop => "force_stop",
            Event::FinishProcessing => "finish_processing",
            Event::Reload => "reload",
            Event::MessagesCreated { .. } => "messages_created",
            Event::MessagesRefreshed { .. } => "messages_refreshed",
            Event::AnswerRecorded(_) => "answer_recorded",
            Event::QuestionsFetched(_) => "questions_fetched",
            Event::ContextConfirmed => "context_confirmed",
            Event::ResolutionContinued(_) => "resolution_continued",
            Event::ProcessingStarted(_) => "processing_started",
            Event::ProcessingStopped => "processing_stopped",
            Event::ProcessingCompleted => "processing_completed",
            Event::SessionLoaded(_) => "session_loaded",
            Event::RequestFailed { .. } => "request_failed",
            Event::StatusPolled(_) => "status_polled",
            Event::LogsPolled(_) => "logs_polled",
            Event::PollFailed { .. } => "poll_failed",
        }
    }
}
