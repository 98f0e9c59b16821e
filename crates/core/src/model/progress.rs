use chrono::{DateTime, Utc};

use crate::model::ids::{CourseId, EnrollmentId, LessonId};

/// `round(100 * part / whole)` with halves rounded up, clamped to 0..=100.
///
/// Returns 0 when `whole` is 0.
#[must_use]
pub fn percentage(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = part.min(whole) as u128;
    let whole = whole as u128;
    let rounded = (200 * part + whole) / (2 * whole);
    u8::try_from(rounded).unwrap_or(100)
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// Persisted progress of one enrollment on one lesson.
///
/// At most one record exists per (enrollment, lesson); once `completed_at`
/// is set it is never cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgress {
    pub enrollment_id: EnrollmentId,
    pub lesson_id: LessonId,
    pub completed_at: Option<DateTime<Utc>>,
    pub watched_duration_seconds: Option<u32>,
}

impl LessonProgress {
    #[must_use]
    pub fn new(enrollment_id: EnrollmentId, lesson_id: LessonId) -> Self {
        Self {
            enrollment_id,
            lesson_id,
            completed_at: None,
            watched_duration_seconds: None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Apply a partial update in place.
    ///
    /// A completion timestamp only lands on an incomplete record; watch time
    /// is last-write-wins. Returns `true` if this call completed the lesson.
    pub fn apply(&mut self, patch: &LessonProgressPatch) -> bool {
        let mut newly_completed = false;
        if let Some(at) = patch.completed_at {
            if self.completed_at.is_none() {
                self.completed_at = Some(at);
                newly_completed = true;
            }
        }
        if let Some(seconds) = patch.watched_duration_seconds {
            self.watched_duration_seconds = Some(seconds);
        }
        newly_completed
    }
}

/// Partial update for a lesson progress record. `None` fields are left as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LessonProgressPatch {
    pub completed_at: Option<DateTime<Utc>>,
    pub watched_duration_seconds: Option<u32>,
}

impl LessonProgressPatch {
    #[must_use]
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            completed_at: Some(at),
            watched_duration_seconds: None,
        }
    }

    #[must_use]
    pub fn watched(seconds: u32) -> Self {
        Self {
            completed_at: None,
            watched_duration_seconds: Some(seconds),
        }
    }
}

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

/// A learner's enrollment in a course, with the stored aggregate percentage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub course_id: CourseId,
    pub progress_percentage: u8,
}

impl Enrollment {
    #[must_use]
    pub fn new(id: EnrollmentId, course_id: CourseId) -> Self {
        Self {
            id,
            course_id,
            progress_percentage: 0,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
