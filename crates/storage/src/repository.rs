use async_trait::async_trait;
use course_core::model::{
    CourseId, Enrollment, EnrollmentId, Lesson, LessonId, LessonProgress, LessonProgressPatch,
    Quiz,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result of a lesson progress upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressWrite {
    /// The record as stored after the write.
    pub record: LessonProgress,
    /// This write moved the lesson from incomplete to complete.
    pub newly_completed: bool,
}

#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// Persist or update a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// Lessons of a course ordered by `order_index`, then id.
    ///
    /// An unknown course yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError>;
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or update a quiz, keyed by its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another quiz is already attached to the lesson.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch the quiz attached to a lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the lesson has no quiz.
    async fn get_quiz(&self, lesson_id: LessonId) -> Result<Quiz, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the enrollment cannot be stored.
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not exist.
    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError>;

    /// Store the aggregate completion percentage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the enrollment does not exist.
    async fn update_enrollment_aggregate(
        &self,
        id: EnrollmentId,
        percentage: u8,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// All lesson progress records of an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError>;

    /// Create or update the single record for (enrollment, lesson) in one
    /// conditional write.
    ///
    /// A completion timestamp only lands on a record that is not yet
    /// complete; watch time overwrites.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails; nothing is changed then.
    async fn upsert_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        patch: LessonProgressPatch,
    ) -> Result<ProgressWrite, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    lessons: Arc<Mutex<HashMap<LessonId, Lesson>>>,
    quizzes: Arc<Mutex<HashMap<LessonId, Quiz>>>,
    enrollments: Arc<Mutex<HashMap<EnrollmentId, Enrollment>>>,
    progress: Arc<Mutex<HashMap<(EnrollmentId, LessonId), LessonProgress>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl LessonRepository for InMemoryRepository {
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        guard.insert(lesson.id(), lesson.clone());
        Ok(())
    }

    async fn get_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        let mut lessons: Vec<Lesson> = guard
            .values()
            .filter(|l| l.course_id() == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.order_index(), l.id()));
        Ok(lessons)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self.quizzes.lock().map_err(poisoned)?;
        if guard
            .get(&quiz.lesson_id())
            .is_some_and(|existing| existing.id() != quiz.id())
        {
            return Err(StorageError::Conflict);
        }
        guard.retain(|_, existing| existing.id() != quiz.id());
        guard.insert(quiz.lesson_id(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, lesson_id: LessonId) -> Result<Quiz, StorageError> {
        let guard = self.quizzes.lock().map_err(poisoned)?;
        guard.get(&lesson_id).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = self.enrollments.lock().map_err(poisoned)?;
        guard.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError> {
        let guard = self.enrollments.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn update_enrollment_aggregate(
        &self,
        id: EnrollmentId,
        percentage: u8,
    ) -> Result<(), StorageError> {
        let mut guard = self.enrollments.lock().map_err(poisoned)?;
        let enrollment = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
        enrollment.progress_percentage = percentage.min(100);
        Ok(())
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn get_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut records: Vec<LessonProgress> = guard
            .values()
            .filter(|r| r.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.lesson_id);
        Ok(records)
    }

    async fn upsert_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        patch: LessonProgressPatch,
    ) -> Result<ProgressWrite, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let record = guard
            .entry((enrollment_id, lesson_id))
            .or_insert_with(|| LessonProgress::new(enrollment_id, lesson_id));
        let newly_completed = record.apply(&patch);
        Ok(ProgressWrite {
            record: record.clone(),
            newly_completed,
        })
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub lessons: Arc<dyn LessonRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub progress: Arc<dyn LessonProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Expose one repository value through every trait object.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: LessonRepository
            + QuizRepository
            + EnrollmentRepository
            + LessonProgressRepository
            + Clone
            + 'static,
    {
        Self {
            lessons: Arc::new(repo.clone()),
            quizzes: Arc::new(repo.clone()),
            enrollments: Arc::new(repo.clone()),
            progress: Arc::new(repo),
        }
    }
}
