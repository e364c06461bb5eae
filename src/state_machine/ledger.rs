//! Ambiguity question/answer ledger

use crate::backend::QuestionSet;
use crate::session::Message;
use serde::Serialize;

/// Questions asked during ambiguity resolution and the answers given so far.
///
/// Invariant: `answers.len() <= questions.len()`. Fields are private so the
/// only way in is through the constructors and [`AmbiguityLedger::record`],
/// which drop answers beyond the question count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AmbiguityLedger {
    questions: Vec<String>,
    answers: Vec<String>,
    /// Question currently shown to the user. Usually `questions[answers.len()]`,
    /// but the backend may ask a follow-up outside the list once every
    /// listed question has an answer.
    current_question: Option<String>,
}

impl AmbiguityLedger {
    pub fn new(questions: Vec<String>) -> Self {
        let current_question = questions.first().cloned();
        Self {
            questions,
            answers: Vec::new(),
            current_question,
        }
    }

    /// Seed from the ambiguity message the backend posts after the first query.
    ///
    /// Some endpoints omit `all_questions`; the current question alone is
    /// then the best available list until the full set is fetched.
    pub fn from_message(message: &Message) -> Self {
        let questions = if message.all_questions.is_empty() {
            message.current_question.iter().cloned().collect()
        } else {
            message.all_questions.clone()
        };
        let mut ledger = Self::new(questions);
        if message.current_question.is_some() {
            ledger.current_question.clone_from(&message.current_question);
        }
        ledger
    }

    /// Build from the backend's record, truncating surplus answers
    pub fn from_backend(set: &QuestionSet) -> Self {
        let mut ledger = Self::new(set.questions.clone());
        ledger.record(set.answers.iter().cloned());
        ledger
    }

    /// Replace questions and answers with the backend's record.
    ///
    /// The current question is kept when the backend's list has no
    /// unanswered entry left, since it may be an unlisted follow-up.
    pub fn reconcile(&mut self, set: &QuestionSet) {
        let previous = self.current_question.take();
        *self = Self::from_backend(set);
        if self.current_question.is_none() {
            self.current_question = previous;
        }
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn current_question(&self) -> Option<&str> {
        self.current_question.as_deref()
    }

    pub fn set_current_question(&mut self, question: Option<String>) {
        self.current_question = question;
    }

    pub fn remaining(&self) -> usize {
        self.questions.len() - self.answers.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Whether the backend's counters agree with this ledger
    pub fn matches(&self, answered: usize, total: usize) -> bool {
        self.answers.len() == answered && self.questions.len() == total
    }

    /// Record answers in order. Returns how many were kept; answers past the
    /// last question are dropped.
    pub fn record(&mut self, answers: impl IntoIterator<Item = String>) -> usize {
        let room = self.remaining();
        let before = self.answers.len();
        self.answers.extend(answers.into_iter().take(room));
        self.current_question = self.questions.get(self.answers.len()).cloned();
        self.answers.len() - before
    }
}
