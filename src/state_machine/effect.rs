//! Effects produced by state transitions

use crate::backend::{ProcessingConfig, ProcessingLog, ProcessingSnapshot};
use crate::session::{AmbiguityUpdate, Message, MessageStatus, MessageType};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    // Backend requests, run in the background; each reports back with an event
    CreateMessage {
        text: String,
    },
    SubmitAnswers {
        answers: Vec<String>,
    },
    FetchQuestions,
    ConfirmContext,
    ContinueResolving,
    StartProcessing {
        config: ProcessingConfig,
    },
    StopProcessing,
    CompleteProcessing,
    RefreshMessages,
    LoadSession,

    /// Abandon in-flight requests; their responses will never be applied
    CancelRequests,

    // Pollers
    StartPolling,
    StopPolling,

    // Transcript
    AppendMessages(Vec<Message>),
    AppendLocalMessage {
        message_type: MessageType,
        content: String,
    },
    ReplaceTranscript(Vec<Message>),
    UpdateAmbiguity(AmbiguityUpdate),
    CloseAmbiguity,

    /// Publish the new state to readers and subscribers
    PublishState,

    // Client notifications
    NotifyProgress(ProcessingSnapshot),
    NotifyLogs(Vec<ProcessingLog>),
    NotifyError {
        message: String,
    },
    NotifyAuthRequired,
}

impl Effect {
    pub fn notify_error(message: impl Into<String>) -> Self {
        Effect::NotifyError {
            message: message.into(),
        }
    }

    pub fn update_ambiguity(
        status: MessageStatus,
        current_question: Option<String>,
        answered: usize,
        total: usize,
    ) -> Self {
        Effect::UpdateAmbiguity(AmbiguityUpdate {
            status,
            current_question,
            answered,
            total,
        })
    }
}
