//! Session transcript model
//!
//! Messages are append-only. The only in-place edits are status and
//! question bookkeeping on ambiguity messages, and the transcript keeps at
//! most one ambiguity message `active` at a time.

use serde::{Deserialize, Serialize};

/// Message type for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
    Ambiguity,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Active,
    Completed,
    ContextConfirmation,
}

/// A transcript message.
///
/// The backend reports question bookkeeping in camelCase on some endpoints
/// and snake_case on others; both decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(
        default,
        alias = "currentQuestion",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_question: Option<String>,
    #[serde(
        default,
        alias = "answeredQuestions",
        skip_serializing_if = "Option::is_none"
    )]
    pub answered_questions: Option<usize>,
    #[serde(
        default,
        alias = "totalQuestions",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_questions: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
}

impl Message {
    /// A message created on this side rather than returned by the backend
    pub fn local(message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: format!("local_{}", uuid::Uuid::new_v4()),
            message_type,
            content: content.into(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            status: None,
            current_question: None,
            answered_questions: None,
            total_questions: None,
            all_questions: Vec::new(),
            domain: None,
            scope: None,
            regions: None,
            metrics: None,
            expanded: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_active_ambiguity(&self) -> bool {
        self.message_type == MessageType::Ambiguity && self.status == Some(MessageStatus::Active)
    }
}

/// Bookkeeping applied to the session's ambiguity message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityUpdate {
    pub status: MessageStatus,
    pub current_question: Option<String>,
    pub answered: usize,
    pub total: usize,
}

/// Ordered messages of one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Build from a backend listing. If the listing has several active
    /// ambiguity messages only the newest stays active.
    pub fn new(messages: Vec<Message>) -> Self {
        let mut transcript = Self::default();
        for message in messages {
            transcript.append(message);
        }
        transcript
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message. A message whose id is already present replaces the
    /// earlier copy in place.
    pub fn append(&mut self, message: Message) {
        if message.is_active_ambiguity() {
            self.supersede_active_ambiguity(Some(&message.id));
        }
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
        } else {
            self.messages.push(message);
        }
    }

    pub fn active_ambiguity(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_active_ambiguity())
    }

    /// Apply bookkeeping to the most recent ambiguity message.
    ///
    /// Returns the updated message, or `None` when the session has no
    /// ambiguity message yet.
    pub fn update_ambiguity(&mut self, update: &AmbiguityUpdate) -> Option<&Message> {
        let idx = self
            .messages
            .iter()
            .rposition(|m| m.message_type == MessageType::Ambiguity)?;

        if update.status == MessageStatus::Active {
            let id = self.messages[idx].id.clone();
            self.supersede_active_ambiguity(Some(&id));
        }

        let message = &mut self.messages[idx];
        message.status = Some(update.status);
        message.current_question.clone_from(&update.current_question);
        message.answered_questions = Some(update.answered);
        message.total_questions = Some(update.total);
        Some(&self.messages[idx])
    }

    /// Mark any active ambiguity message completed. Returns whether one was.
    pub fn close_ambiguity(&mut self) -> bool {
        let before = self.active_count();
        self.supersede_active_ambiguity(None);
        before > 0
    }

    fn supersede_active_ambiguity(&mut self, keep: Option<&str>) {
        for m in &mut self.messages {
            if m.is_active_ambiguity() && Some(m.id.as_str()) != keep {
                m.status = Some(MessageStatus::Completed);
            }
        }
    }

    fn active_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_active_ambiguity())
            .count()
    }
}
