use thiserror::Error;

use crate::model::{LessonError, QuestionError, QuizError};
use crate::quiz_session::{QuizSessionError, SessionCommandError};

/// Umbrella error for callers that do not care which domain rule failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Session(#[from] QuizSessionError),
    #[error(transparent)]
    Command(#[from] SessionCommandError),
}
