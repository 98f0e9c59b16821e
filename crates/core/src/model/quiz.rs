use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{LessonId, QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("a question needs at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("option {0} is blank")]
    BlankOption(usize),

    #[error("correct option {index} is out of range for {len} options")]
    CorrectIndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("question {position}: {source}")]
    Question {
        position: usize,
        #[source]
        source: QuestionError,
    },

    #[error("question id {0} appears more than once")]
    DuplicateQuestionId(QuestionId),

    #[error("passing score must be between 0 and 100, got {0}")]
    InvalidPassingScore(u8),

    #[error("time limit must be at least one minute")]
    InvalidTimeLimit,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question with exactly one correct option.
///
/// Deserialization accepts the authoring schema (`question`, `correctAnswer`)
/// as well as the native field names, and validates on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion")]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
}

#[derive(Deserialize)]
struct RawQuestion {
    id: QuestionId,
    #[serde(alias = "question")]
    prompt: String,
    options: Vec<String>,
    #[serde(alias = "correctAnswer")]
    correct_index: usize,
    #[serde(default)]
    explanation: Option<String>,
}

impl TryFrom<RawQuestion> for Question {
    type Error = QuestionError;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        Question::new(
            raw.id,
            raw.prompt,
            raw.options,
            raw.correct_index,
            raw.explanation,
        )
    }
}

impl Question {
    /// Build a validated question.
    ///
    /// Blank explanations are normalized to `None`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is empty, fewer than two options
    /// are given, any option is blank, or `correct_index` is out of range.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_index: usize,
        explanation: Option<String>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions(options.len()));
        }
        if let Some(blank) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::BlankOption(blank));
        }
        if correct_index >= options.len() {
            return Err(QuestionError::CorrectIndexOutOfRange {
                index: correct_index,
                len: options.len(),
            });
        }

        Ok(Self {
            id,
            prompt,
            options,
            correct_index,
            explanation: explanation.filter(|e| !e.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn is_correct(&self, selected: usize) -> bool {
        selected == self.correct_index
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// Immutable description of a quiz attached to a lesson.
///
/// Question order is presentation order. A quiz with zero questions is a
/// legal stored state (authoring not finished); sessions refuse to start on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    id: QuizId,
    lesson_id: LessonId,
    title: String,
    description: Option<String>,
    questions: Vec<Question>,
    passing_score: u8,
    time_limit_minutes: Option<u32>,
}

impl Quiz {
    pub const DEFAULT_PASSING_SCORE: u8 = 70;

    /// Build a validated quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the title is blank, a question id repeats, the
    /// passing score exceeds 100, or the time limit is zero.
    pub fn new(
        id: QuizId,
        lesson_id: LessonId,
        title: impl Into<String>,
        description: Option<String>,
        questions: Vec<Question>,
        passing_score: u8,
        time_limit_minutes: Option<u32>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if passing_score > 100 {
            return Err(QuizError::InvalidPassingScore(passing_score));
        }
        if time_limit_minutes == Some(0) {
            return Err(QuizError::InvalidTimeLimit);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(QuizError::DuplicateQuestionId(question.id()));
            }
        }

        Ok(Self {
            id,
            lesson_id,
            title: title.trim().to_owned(),
            description: description.filter(|d| !d.trim().is_empty()),
            questions,
            passing_score,
            time_limit_minutes,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn passing_score(&self) -> u8 {
        self.passing_score
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> Option<u32> {
        self.time_limit_minutes
    }

    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_minutes
            .map(|minutes| Duration::minutes(i64::from(minutes)))
    }

    #[must_use]
    pub fn is_passing(&self, score: u8) -> bool {
        score >= self.passing_score
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn options(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn question(correct: usize) -> Question {
        Question::new(
            QuestionId::random(),
            "Pick one",
            options(&["a", "b", "c"]),
            correct,
            None,
        )
        .unwrap()
    }

    #[test]
    fn question_rejects_single_option() {
        let err = Question::new(QuestionId::random(), "Q", options(&["only"]), 0, None)
            .unwrap_err();
        assert_eq!(err, QuestionError::TooFewOptions(1));
    }

    #[test]
    fn question_rejects_blank_option() {
        let err = Question::new(QuestionId::random(), "Q", options(&["a", "  "]), 0, None)
            .unwrap_err();
        assert_eq!(err, QuestionError::BlankOption(1));
    }

    #[test]
    fn question_rejects_out_of_range_correct_index() {
        let err = Question::new(QuestionId::random(), "Q", options(&["a", "b"]), 2, None)
            .unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectIndexOutOfRange { index: 2, len: 2 }
        );
    }

    #[test]
    fn blank_explanation_is_dropped() {
        let q = Question::new(
            QuestionId::random(),
            "Q",
            options(&["a", "b"]),
            1,
            Some("   ".into()),
        )
        .unwrap();
        assert_eq!(q.explanation(), None);
        assert!(q.is_correct(1));
        assert!(!q.is_correct(0));
    }

    #[test]
    fn quiz_rejects_duplicate_question_ids() {
        let q = question(0);
        let err = Quiz::new(
            QuizId::new(1),
            LessonId::new(1),
            "Quiz",
            None,
            vec![q.clone(), q.clone()],
            70,
            None,
        )
        .unwrap_err();
        assert_eq!(err, QuizError::DuplicateQuestionId(q.id()));
    }

    #[test]
    fn quiz_validates_score_and_time_limit() {
        let err = Quiz::new(QuizId::new(1), LessonId::new(1), "Quiz", None, vec![], 101, None)
            .unwrap_err();
        assert_eq!(err, QuizError::InvalidPassingScore(101));

        let err = Quiz::new(QuizId::new(1), LessonId::new(1), "Quiz", None, vec![], 70, Some(0))
            .unwrap_err();
        assert_eq!(err, QuizError::InvalidTimeLimit);
    }

    #[test]
    fn empty_quiz_is_a_valid_model() {
        let quiz =
            Quiz::new(QuizId::new(1), LessonId::new(1), " Intro ", None, vec![], 70, Some(15))
                .unwrap();
        assert!(quiz.is_empty());
        assert_eq!(quiz.title(), "Intro");
        assert_eq!(quiz.time_limit(), Some(Duration::minutes(15)));
    }

    #[test]
    fn question_deserializes_authoring_schema() {
        let json = r#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "question": "2 + 2?",
            "options": ["3", "4", "5", "22"],
            "correctAnswer": 1,
            "explanation": ""
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.prompt(), "2 + 2?");
        assert_eq!(q.correct_index(), 1);
        assert_eq!(q.explanation(), None);
    }

    #[test]
    fn question_deserialization_validates() {
        let json = r#"{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "prompt": "2 + 2?",
            "options": ["4", ""],
            "correct_index": 0
        }"#;
        assert!(serde_json::from_str::<Question>(json).is_err());
    }
}
