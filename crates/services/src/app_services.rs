use std::sync::Arc;

use course_core::model::EnrollmentId;
use storage::repository::Storage;

use crate::Clock;
use crate::error::{CourseServicesError, NavigationError};
use crate::navigation::LessonNavigator;
use crate::progress_tracker::ProgressTracker;

/// Assembles the progress tracker and per-enrollment navigators over one
/// storage backend.
#[derive(Clone)]
pub struct CourseServices {
    clock: Clock,
    storage: Storage,
    tracker: Arc<ProgressTracker>,
}

impl CourseServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `CourseServicesError` if connecting or migrating fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, CourseServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock))
    }

    /// Build services over an already assembled backend, e.g. `Storage::in_memory()`.
    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let tracker = Arc::new(ProgressTracker::new(
            clock,
            Arc::clone(&storage.lessons),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
        ));
        Self {
            clock,
            storage,
            tracker,
        }
    }

    #[must_use]
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Load a navigator for one enrollment's course.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::EnrollmentNotFound` for an unknown enrollment,
    /// or a storage error if the course cannot be loaded.
    pub async fn navigator(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<LessonNavigator, NavigationError> {
        LessonNavigator::load(
            self.clock,
            enrollment_id,
            self.storage.enrollments.as_ref(),
            self.storage.lessons.as_ref(),
            Arc::clone(&self.storage.quizzes),
            ProgressTracker::clone(&self.tracker),
        )
        .await
    }
}
