use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("expected {expected} answers, got {got}")]
    AnswerCountMismatch { expected: usize, got: usize },

    #[error("quiz has no questions")]
    Empty,
}

/// Multiple-choice question filling one declared quiz slot (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub slot: u32,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDefinition {
    /// Item id recorded when the quiz is passed, e.g. `dom-quiz`.
    pub id: String,
    pub questions: Vec<QuizQuestion>,
    pub passing_percent: u8,
}

/// Result of grading one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizOutcome {
    pub correct: u32,
    pub total: u32,
    pub percent: u8,
    pub passed: bool,
}

impl QuizDefinition {
    /// Grade an attempt; `answers[i]` is the chosen option for question `i`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Empty` for a quiz without questions and
    /// `QuizError::AnswerCountMismatch` when the answer count differs.
    pub fn grade(&self, answers: &[usize]) -> Result<QuizOutcome, QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::Empty);
        }
        if answers.len() != self.questions.len() {
            return Err(QuizError::AnswerCountMismatch {
                expected: self.questions.len(),
                got: answers.len(),
            });
        }

        let correct = self
            .questions
            .iter()
            .zip(answers)
            .filter(|(q, a)| q.correct_option == **a)
            .count();
        let correct = u32::try_from(correct).unwrap_or(u32::MAX);
        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let percent = u8::try_from(correct.saturating_mul(100) / total).unwrap_or(100);

        Ok(QuizOutcome {
            correct,
            total,
            percent,
            passed: percent >= self.passing_percent,
        })
    }
}
