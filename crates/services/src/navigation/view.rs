use course_core::model::{Lesson, Quiz};
use course_core::{QuizResult, QuizSession};

use crate::error::ProgressError;
use crate::progress_tracker::CompletionOutcome;

/// What the open lesson renders.
#[derive(Debug)]
pub enum LessonContent {
    Video,
    Text,
    /// A quiz attempt, fresh on every open.
    Quiz(QuizSession),
    /// The quiz exists but has no questions.
    QuizEmpty,
    /// No quiz is stored for this lesson.
    QuizMissing,
}

impl LessonContent {
    #[must_use]
    pub fn quiz_session(&self) -> Option<&QuizSession> {
        match self {
            LessonContent::Quiz(session) => Some(session),
            _ => None,
        }
    }

    /// The content cannot be studied, so no completion will ever fire.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LessonContent::QuizEmpty | LessonContent::QuizMissing)
    }
}

/// A completion whose persistence did not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCompletion {
    /// The lesson record was not written.
    Record,
    /// The lesson record was written; the course percentage was not.
    RefreshAggregate,
}

/// The lesson currently displayed.
#[derive(Debug)]
pub struct ActiveLesson {
    pub(crate) position: usize,
    pub(crate) lesson: Lesson,
    pub(crate) content: LessonContent,
    pub(crate) pending: Option<PendingCompletion>,
}

impl ActiveLesson {
    /// 0-based position in the course outline.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    #[must_use]
    pub fn content(&self) -> &LessonContent {
        &self.content
    }

    #[must_use]
    pub fn pending(&self) -> Option<PendingCompletion> {
        self.pending
    }
}

/// A submitted quiz attempt and whether its completion was saved.
///
/// The result stands on its own; a failed save is reported beside it.
#[derive(Debug)]
pub struct QuizCompletion {
    pub result: QuizResult,
    pub saved: Result<CompletionOutcome, ProgressError>,
}

/// Outcome of one quiz command routed through the navigator.
#[derive(Debug)]
pub enum QuizStep {
    Selected { option: usize },
    Moved { index: usize },
    Retreated { index: usize },
    Restarted,
    /// The attempt was submitted, either by advancing from the last question
    /// or because the time limit ran out before the command was applied.
    Completed(QuizCompletion),
}

/// One row of the results screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem<'a> {
    pub position: usize,
    pub prompt: &'a str,
    pub selected: Option<&'a str>,
    pub correct: &'a str,
    pub is_correct: bool,
    pub explanation: Option<&'a str>,
}

/// Pair each scored question with its prompt and option text.
#[must_use]
pub fn review_items<'a>(quiz: &'a Quiz, result: &QuizResult) -> Vec<ReviewItem<'a>> {
    quiz.questions()
        .iter()
        .zip(&result.outcomes)
        .enumerate()
        .map(|(i, (question, outcome))| ReviewItem {
            position: i + 1,
            prompt: question.prompt(),
            selected: outcome.selected.and_then(|s| question.option(s)),
            correct: question.option(outcome.correct_index).unwrap_or_default(),
            is_correct: outcome.is_correct,
            explanation: question.explanation(),
        })
        .collect()
}
