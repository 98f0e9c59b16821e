use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use course_core::Clock;
use course_core::model::{
    Enrollment, EnrollmentId, Lesson, LessonId, LessonProgress, LessonProgressPatch, percentage,
};
use storage::repository::{
    EnrollmentRepository, LessonProgressRepository, LessonRepository, StorageError,
};

use crate::error::ProgressError;

/// Result of a completion signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub lesson_id: LessonId,
    /// This signal moved the lesson from incomplete to complete.
    pub newly_completed: bool,
    /// Recomputed course percentage; `None` when the lesson was already
    /// complete and nothing was recomputed.
    pub aggregate: Option<u8>,
}

/// One row of the course lesson list with its completion state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonStatus {
    pub lesson: Lesson,
    pub completed_at: Option<DateTime<Utc>>,
    pub watched_duration_seconds: Option<u32>,
}

impl LessonStatus {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Per-lesson completion for an enrollment, in course order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseProgress {
    pub enrollment_id: EnrollmentId,
    pub lessons: Vec<LessonStatus>,
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl CourseProgress {
    #[must_use]
    pub fn status(&self, lesson_id: LessonId) -> Option<&LessonStatus> {
        self.lessons.iter().find(|s| s.lesson.id() == lesson_id)
    }
}

/// Persists lesson completion and keeps the enrollment percentage in step.
///
/// The percentage is always derived from the full set of lesson progress
/// records, never from a maintained counter.
#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    lessons: Arc<dyn LessonRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    progress: Arc<dyn LessonProgressRepository>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        lessons: Arc<dyn LessonRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        progress: Arc<dyn LessonProgressRepository>,
    ) -> Self {
        Self {
            clock,
            lessons,
            enrollments,
            progress,
        }
    }

    /// Mark a lesson complete for an enrollment.
    ///
    /// Idempotent: a second signal for a completed lesson writes nothing new
    /// and does not recompute the percentage. The lesson record is written
    /// before the percentage is derived from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `LessonNotInCourse` for
    /// bad identifiers, `Storage` if the lesson record could not be written,
    /// and `AggregateUpdate` if only the percentage update failed.
    pub async fn record_lesson_complete(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
    ) -> Result<CompletionOutcome, ProgressError> {
        let (enrollment, lessons) = self.course_of(enrollment_id, lesson_id).await?;

        let write = self
            .progress
            .upsert_lesson_progress(
                enrollment_id,
                lesson_id,
                LessonProgressPatch::completed(self.clock.now()),
            )
            .await?;

        if !write.newly_completed {
            tracing::debug!(
                enrollment_id = %enrollment_id,
                lesson_id = %lesson_id,
                "lesson already complete"
            );
            return Ok(CompletionOutcome {
                lesson_id,
                newly_completed: false,
                aggregate: None,
            });
        }

        let aggregate = self
            .store_aggregate(&enrollment, &lessons)
            .await
            .map_err(|source| ProgressError::AggregateUpdate { lesson_id, source })?;

        tracing::info!(
            enrollment_id = %enrollment_id,
            lesson_id = %lesson_id,
            aggregate,
            "lesson completed"
        );

        Ok(CompletionOutcome {
            lesson_id,
            newly_completed: true,
            aggregate: Some(aggregate),
        })
    }

    /// Record how far a video has been watched. Last write wins; this never
    /// completes a lesson.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `LessonNotInCourse` for
    /// bad identifiers, and `Storage` if the write fails.
    pub async fn record_watch_progress(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        seconds: u32,
    ) -> Result<(), ProgressError> {
        self.course_of(enrollment_id, lesson_id).await?;
        self.progress
            .upsert_lesson_progress(enrollment_id, lesson_id, LessonProgressPatch::watched(seconds))
            .await?;
        tracing::debug!(
            enrollment_id = %enrollment_id,
            lesson_id = %lesson_id,
            seconds,
            "watch progress recorded"
        );
        Ok(())
    }

    /// Derive the completion percentage from stored records.
    ///
    /// Records for lessons no longer in the course are ignored; a course
    /// without lessons reports 0.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `Storage` on failure.
    pub async fn compute_aggregate(&self, enrollment_id: EnrollmentId) -> Result<u8, ProgressError> {
        let enrollment = self.enrollment(enrollment_id).await?;
        let lessons = self.lessons.get_lessons(enrollment.course_id).await?;
        Ok(self.derive_aggregate(enrollment_id, &lessons).await?)
    }

    /// Recompute the percentage and store it on the enrollment.
    ///
    /// Finishes a completion that failed with `AggregateUpdate`; repeating
    /// `record_lesson_complete` for that lesson reports it as already complete
    /// and leaves the stored percentage alone.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `Storage` on failure.
    pub async fn refresh_aggregate(&self, enrollment_id: EnrollmentId) -> Result<u8, ProgressError> {
        let enrollment = self.enrollment(enrollment_id).await?;
        let lessons = self.lessons.get_lessons(enrollment.course_id).await?;
        Ok(self.store_aggregate(&enrollment, &lessons).await?)
    }

    /// Lesson list with completion flags, for a course sidebar.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::EnrollmentNotFound` or `Storage` on failure.
    pub async fn course_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<CourseProgress, ProgressError> {
        let enrollment = self.enrollment(enrollment_id).await?;
        let lessons = self.lessons.get_lessons(enrollment.course_id).await?;
        let mut records: HashMap<LessonId, LessonProgress> = self
            .progress
            .get_lesson_progress(enrollment_id)
            .await?
            .into_iter()
            .map(|r| (r.lesson_id, r))
            .collect();

        let statuses: Vec<LessonStatus> = lessons
            .into_iter()
            .map(|lesson| {
                let record = records.remove(&lesson.id());
                LessonStatus {
                    completed_at: record.as_ref().and_then(|r| r.completed_at),
                    watched_duration_seconds: record.and_then(|r| r.watched_duration_seconds),
                    lesson,
                }
            })
            .collect();

        let completed = statuses.iter().filter(|s| s.is_completed()).count();
        let total = statuses.len();
        Ok(CourseProgress {
            enrollment_id,
            lessons: statuses,
            completed,
            total,
            percentage: percentage(completed, total),
        })
    }

    async fn enrollment(&self, id: EnrollmentId) -> Result<Enrollment, ProgressError> {
        match self.enrollments.get_enrollment(id).await {
            Ok(enrollment) => Ok(enrollment),
            Err(StorageError::NotFound) => Err(ProgressError::EnrollmentNotFound(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Enrollment and its course lessons, after checking that `lesson_id`
    /// belongs to that course.
    async fn course_of(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
    ) -> Result<(Enrollment, Vec<Lesson>), ProgressError> {
        let enrollment = self.enrollment(enrollment_id).await?;
        let lessons = self.lessons.get_lessons(enrollment.course_id).await?;
        if !lessons.iter().any(|l| l.id() == lesson_id) {
            return Err(ProgressError::LessonNotInCourse {
                lesson_id,
                course_id: enrollment.course_id,
            });
        }
        Ok((enrollment, lessons))
    }

    async fn derive_aggregate(
        &self,
        enrollment_id: EnrollmentId,
        lessons: &[Lesson],
    ) -> Result<u8, StorageError> {
        let records = self.progress.get_lesson_progress(enrollment_id).await?;
        let completed = records
            .iter()
            .filter(|r| r.is_completed() && lessons.iter().any(|l| l.id() == r.lesson_id))
            .count();
        Ok(percentage(completed, lessons.len()))
    }

    async fn store_aggregate(
        &self,
        enrollment: &Enrollment,
        lessons: &[Lesson],
    ) -> Result<u8, StorageError> {
        let aggregate = self.derive_aggregate(enrollment.id, lessons).await?;
        self.enrollments
            .update_enrollment_aggregate(enrollment.id, aggregate)
            .await?;
        Ok(aggregate)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
