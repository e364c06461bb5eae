//! Conversation state types

use super::event::PollSource;
use super::ledger::AmbiguityLedger;
use crate::backend::{
    ProcessingLog, ProcessingSnapshot, ProcessingStage, RunStatus, StageStatus, Step,
};
use serde::Serialize;

// ============================================================================
// Processing Progress
// ============================================================================

/// Stage catalog the backend runs, used until the first status poll lands
const STAGE_CATALOG: [(&str, &str, &str); 7] = [
    ("planning", "Planning", "Database"),
    ("coding", "Coding", "Code"),
    ("verification", "In-conversation Verification", "TrendingUp"),
    ("execution", "Execution", "FileText"),
    ("fixing", "Code-fixing", "Code"),
    ("optimization", "Plan Optimization", "TrendingUp"),
    ("summarization", "Summarization", "FileText"),
];

/// Progress of a processing run as last reported by the pollers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingProgress {
    pub run_status: RunStatus,
    pub stages: Vec<ProcessingStage>,
    pub current_stage: usize,
    pub overall_progress: f64,
    pub logs: Vec<ProcessingLog>,
    /// Failed status polls since the last successful one
    pub status_failures: u32,
    /// Failed log polls since the last successful one
    pub log_failures: u32,
}

impl Default for ProcessingProgress {
    fn default() -> Self {
        let stages = STAGE_CATALOG
            .iter()
            .map(|(id, name, icon)| ProcessingStage {
                id: (*id).to_string(),
                name: (*name).to_string(),
                icon: Some((*icon).to_string()),
                status: StageStatus::Queued,
                progress: 0.0,
                started_at: None,
                completed_at: None,
            })
            .collect();

        Self {
            run_status: RunStatus::Initializing,
            stages,
            current_stage: 0,
            overall_progress: 0.0,
            logs: Vec::new(),
            status_failures: 0,
            log_failures: 0,
        }
    }
}

impl ProcessingProgress {
    pub fn from_snapshot(snapshot: &ProcessingSnapshot) -> Self {
        let mut progress = Self::default();
        progress.apply(snapshot);
        progress
    }

    /// Take over a status poll. Resets the status failure count.
    pub fn apply(&mut self, snapshot: &ProcessingSnapshot) {
        self.run_status = snapshot.status;
        if !snapshot.stages.is_empty() {
            self.stages.clone_from(&snapshot.stages);
        }
        self.current_stage = snapshot.current_stage;
        self.overall_progress = snapshot.overall_progress.clamp(0.0, 100.0);
        self.status_failures = 0;
    }

    /// Append logs not seen before, returning the new ones.
    ///
    /// The backend returns the full log on every poll, so entries are keyed by id.
    pub fn merge_logs(&mut self, logs: Vec<ProcessingLog>) -> Vec<ProcessingLog> {
        let fresh: Vec<ProcessingLog> = logs
            .into_iter()
            .filter(|log| !self.logs.iter().any(|seen| seen.id == log.id))
            .collect();
        self.logs.extend(fresh.iter().cloned());
        self.log_failures = 0;
        fresh
    }

    /// Count a failed poll against its own poller, returning that poller's
    /// consecutive failures
    pub fn record_failure(&mut self, source: PollSource) -> u32 {
        let count = match source {
            PollSource::Status => &mut self.status_failures,
            PollSource::Logs => &mut self.log_failures,
        };
        *count += 1;
        *count
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a session reached the completed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Stopped,
    Failed { error: String },
    /// Contact with the backend was lost during processing and could not be
    /// re-established
    Abandoned { reason: String },
}

impl Outcome {
    pub fn from_run(snapshot: &ProcessingSnapshot) -> Option<Self> {
        match snapshot.status {
            RunStatus::Completed => Some(Outcome::Succeeded),
            RunStatus::Stopped => Some(Outcome::Stopped),
            RunStatus::Failed => Some(Outcome::Failed {
                error: snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| "Processing failed".to_string()),
            }),
            RunStatus::Initializing | RunStatus::Processing => None,
        }
    }
}

/// State to fall back to if a continue-resolving request fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum ResumeOrigin {
    Context { confirmed: bool },
    Completed { outcome: Outcome },
}

// ============================================================================
// Conversation State
// ============================================================================

/// Per-session conversation state.
///
/// Rebuilt from the backend whenever a session is opened or reloaded; never
/// persisted on this side.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// Waiting for the analysis question
    #[default]
    Query,

    /// Question sent, waiting for the backend's clarifying questions
    SubmittingQuery { text: String },

    /// Asking clarifying questions
    Ambiguity { ledger: AmbiguityLedger },

    /// Answers sent, waiting for the backend to record them
    SubmittingAnswers {
        ledger: AmbiguityLedger,
        pending: Vec<String>,
    },

    /// All questions answered; context shown for confirmation
    Context {
        ledger: AmbiguityLedger,
        confirmed: bool,
    },

    ConfirmingContext { ledger: AmbiguityLedger },

    /// Asked the backend for additional questions
    ResumingResolution {
        ledger: AmbiguityLedger,
        origin: ResumeOrigin,
    },

    /// Analysis running. `started` is false until the backend acknowledges
    /// the start request.
    Processing {
        ledger: AmbiguityLedger,
        progress: ProcessingProgress,
        started: bool,
    },

    /// Polling kept failing; re-fetching the session before giving up
    Recovering {
        ledger: AmbiguityLedger,
        progress: ProcessingProgress,
    },

    Completed {
        ledger: AmbiguityLedger,
        outcome: Outcome,
    },

    /// Follow-up question sent after completion
    SubmittingFollowUp {
        ledger: AmbiguityLedger,
        outcome: Outcome,
        text: String,
    },
}

impl ConvState {
    /// The wizard step this state belongs to
    pub fn step(&self) -> Step {
        match self {
            ConvState::Query | ConvState::SubmittingQuery { .. } => Step::Query,
            ConvState::Ambiguity { .. } | ConvState::SubmittingAnswers { .. } => Step::Ambiguity,
            ConvState::Context { .. } | ConvState::ConfirmingContext { .. } => Step::Context,
            ConvState::ResumingResolution { origin, .. } => match origin {
                ResumeOrigin::Context { .. } => Step::Context,
                ResumeOrigin::Completed { .. } => Step::Completed,
            },
            ConvState::Processing { .. } | ConvState::Recovering { .. } => Step::Processing,
            ConvState::Completed { .. } | ConvState::SubmittingFollowUp { .. } => Step::Completed,
        }
    }

    /// Check if a backend request is outstanding and user input must wait
    pub fn is_awaiting_response(&self) -> bool {
        matches!(
            self,
            ConvState::SubmittingQuery { .. }
                | ConvState::SubmittingAnswers { .. }
                | ConvState::ConfirmingContext { .. }
                | ConvState::ResumingResolution { .. }
                | ConvState::Recovering { .. }
                | ConvState::SubmittingFollowUp { .. }
        )
    }

    /// Only the ambiguity step takes answers
    pub fn accepts_ambiguity_input(&self) -> bool {
        matches!(self, ConvState::Ambiguity { .. })
    }

    pub fn is_context_confirmed(&self) -> bool {
        matches!(self, ConvState::Context { confirmed: true, .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConvState::Completed { .. })
    }

    /// Pollers should run in this state
    pub fn is_polling(&self) -> bool {
        matches!(self, ConvState::Processing { started: true, .. })
    }

    pub fn ledger(&self) -> Option<&AmbiguityLedger> {
        match self {
            ConvState::Query | ConvState::SubmittingQuery { .. } => None,
            ConvState::Ambiguity { ledger }
            | ConvState::SubmittingAnswers { ledger, .. }
            | ConvState::Context { ledger, .. }
            | ConvState::ConfirmingContext { ledger }
            | ConvState::ResumingResolution { ledger, .. }
            | ConvState::Processing { ledger, .. }
            | ConvState::Recovering { ledger, .. }
            | ConvState::Completed { ledger, .. }
            | ConvState::SubmittingFollowUp { ledger, .. } => Some(ledger),
        }
    }

    pub fn progress(&self) -> Option<&ProcessingProgress> {
        match self {
            ConvState::Processing { progress, .. } | ConvState::Recovering { progress, .. } => {
                Some(progress)
            }
            _ => None,
        }
    }

    /// Short name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ConvState::Query => "query",
            ConvState::SubmittingQuery { .. } => "submitting_query",
            ConvState::Ambiguity { .. } => "ambiguity",
            ConvState::SubmittingAnswers { .. } => "submitting_answers",
            ConvState::Context { .. } => "context",
            ConvState::ConfirmingContext { .. } => "confirming_context",
            ConvState::ResumingResolution { .. } => "resuming_resolution",
            ConvState::Processing { .. } => "processing",
            ConvState::Recovering { .. } => "recovering",
            ConvState::Completed { .. } => "completed",
            ConvState::SubmittingFollowUp { .. } => "submitting_follow_up",
        }
    }
}

/// Immutable per-session settings the transition function reads
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub session_id: String,
    /// Consecutive poll failures tolerated before recovery
    pub max_poll_failures: u32,
}

impl ConvContext {
    pub fn new(session_id: impl Into<String>, max_poll_failures: u32) -> Self {
        Self {
            session_id: session_id.into(),
            max_poll_failures,
        }
    }
}
