//! Shared error types for the services crate.

use thiserror::Error;

use course_core::{QuizSessionError, SessionCommandError};
use course_core::model::{CourseId, EnrollmentId, LessonError, LessonId, LessonKind};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressTracker`.
///
/// None of these are retried internally; every write is idempotent, so the
/// caller may simply repeat the call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),

    #[error("lesson {lesson_id} is not part of course {course_id}")]
    LessonNotInCourse {
        lesson_id: LessonId,
        course_id: CourseId,
    },

    /// The lesson record was written but the course percentage was not.
    #[error("lesson {lesson_id} was saved but the course progress update failed: {source}")]
    AggregateUpdate {
        lesson_id: LessonId,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `LessonNavigator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),

    #[error("course {0} has no lessons")]
    EmptyCourse(CourseId),

    #[error("lesson {0} not found in this course")]
    LessonNotFound(LessonId),

    #[error("no lesson is open")]
    NoLessonOpen,

    #[error("expected a {expected} lesson, the open lesson is {actual}")]
    WrongLessonKind {
        expected: LessonKind,
        actual: LessonKind,
    },

    #[error("the open lesson has no quiz attempt in progress")]
    NoActiveQuiz,

    #[error(transparent)]
    Session(#[from] QuizSessionError),

    #[error(transparent)]
    Command(#[from] SessionCommandError),

    #[error(transparent)]
    Outline(#[from] LessonError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping course services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
