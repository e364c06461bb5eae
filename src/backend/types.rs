//! Wire types for the analytics backend

use crate::session::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Sessions
// ============================================================================

/// Wizard step as tracked by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Query,
    Ambiguity,
    Context,
    Processing,
    Completed,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Processing,
    Completed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub domain: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub current_step: Step,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub messages_count: usize,
}

/// Session with its full transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionEnvelope<T> {
    pub session: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserResponse {
    pub user: UserProfile,
}

// ============================================================================
// Ambiguity Resolution
// ============================================================================

/// Status of the backend's ambiguity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityStatus {
    #[default]
    Active,
    ContextConfirmation,
    Confirmed,
    Completed,
}

/// Questions and answers recorded for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<String>,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub status: AmbiguityStatus,
}

/// Raw answer response. Which fields are present depends on `status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AnswerResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub next_question: Option<String>,
    #[serde(default)]
    pub answered_questions: Option<usize>,
    #[serde(default)]
    pub total_questions: Option<usize>,
    #[serde(default)]
    pub total_answered: Option<usize>,
}

/// Outcome of submitting one or more answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// More questions remain
    Active {
        next_question: String,
        answered: usize,
        total: usize,
    },
    /// Every question has an answer; context awaits confirmation
    ContextConfirmation { total_answered: usize },
    /// The response carried neither a next question nor a known status
    Unrecognized { reported: Option<String> },
}

impl From<AnswerResponse> for AnswerOutcome {
    fn from(resp: AnswerResponse) -> Self {
        match (resp.status.as_deref(), resp.next_question) {
            (Some("active"), Some(next_question)) => AnswerOutcome::Active {
                next_question,
                answered: resp.answered_questions.unwrap_or_default(),
                total: resp.total_questions.unwrap_or_default(),
            },
            (Some("context_confirmation"), _) => AnswerOutcome::ContextConfirmation {
                total_answered: resp.total_answered.unwrap_or_default(),
            },
            (status, _) => AnswerOutcome::Unrecognized {
                reported: status.map(str::to_string),
            },
        }
    }
}

/// Response to `continue_resolving`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionContinued {
    pub current_question: String,
    pub total_questions: usize,
    pub answered_questions: usize,
}

// ============================================================================
// Processing
// ============================================================================

pub const MIN_PROCESSING_MINUTES: u32 = 3;
pub const MAX_PROCESSING_MINUTES: u32 = 30;
pub const DEFAULT_PROCESSING_MINUTES: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsDepth {
    Basic,
    #[default]
    Moderate,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingStyle {
    Executive,
    #[default]
    Detailed,
    Visual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossValidation {
    Low,
    #[default]
    Medium,
    High,
}

/// Parameters for a processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Simulated duration in minutes
    #[serde(default = "default_processing_time")]
    pub processing_time: u32,
    #[serde(default)]
    pub analytics_depth: AnalyticsDepth,
    #[serde(default)]
    pub reporting_style: ReportingStyle,
    #[serde(default)]
    pub cross_validation: CrossValidation,
}

fn default_processing_time() -> u32 {
    DEFAULT_PROCESSING_MINUTES
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            processing_time: DEFAULT_PROCESSING_MINUTES,
            analytics_depth: AnalyticsDepth::default(),
            reporting_style: ReportingStyle::default(),
            cross_validation: CrossValidation::default(),
        }
    }
}

impl ProcessingConfig {
    /// Out-of-range durations fall back to the default, matching the backend.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !(MIN_PROCESSING_MINUTES..=MAX_PROCESSING_MINUTES).contains(&self.processing_time) {
            self.processing_time = DEFAULT_PROCESSING_MINUTES;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStarted {
    pub processing_id: String,
    #[serde(default)]
    pub estimated_duration: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Stopped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub status: StageStatus,
    /// Percent complete, 0 to 100
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Overall status of a processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Initializing,
    Processing,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// One status poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSnapshot {
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub current_stage: usize,
    #[serde(default)]
    pub overall_progress: f64,
    #[serde(default)]
    pub stages: Vec<ProcessingStage>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub estimated_completion: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub message: String,
    #[serde(rename = "type", default)]
    pub level: LogLevel,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsResponse {
    pub logs: Vec<ProcessingLog>,
}

// ============================================================================
// Sharing
// ============================================================================

/// What a share link lets its holder do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    #[default]
    View,
    Comment,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareRequest {
    pub session_id: String,
    pub access_level: AccessLevel,
    pub emails: Vec<String>,
}

/// Backend data passed through untouched (results, verification reports,
/// share links, domain and model catalogs)
pub type Document = Value;
