use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("unknown lesson kind: {0}")]
    UnknownKind(String),

    #[error("lesson {lesson} belongs to course {actual}, not {expected}")]
    ForeignLesson {
        lesson: LessonId,
        expected: CourseId,
        actual: CourseId,
    },
}

//
// ─── LESSON KIND ───────────────────────────────────────────────────────────────
//

/// How a lesson is rendered, and therefore what signals its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    /// Completed when the external player reports the end of playback.
    Video,
    /// Completed by an explicit "mark complete" action.
    Text,
    /// Completed when a quiz attempt is submitted, whatever the score.
    Quiz,
}

impl LessonKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonKind::Video => "video",
            LessonKind::Text => "text",
            LessonKind::Quiz => "quiz",
        }
    }
}

impl fmt::Display for LessonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonKind {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "text" => Ok(Self::Text),
            "quiz" => Ok(Self::Quiz),
            other => Err(LessonError::UnknownKind(other.to_string())),
        }
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    id: LessonId,
    course_id: CourseId,
    title: String,
    kind: LessonKind,
    order_index: u32,
    duration_minutes: Option<u32>,
}

impl Lesson {
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        course_id: CourseId,
        title: impl Into<String>,
        kind: LessonKind,
        order_index: u32,
        duration_minutes: Option<u32>,
    ) -> Result<Self, LessonError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        Ok(Self {
            id,
            course_id,
            title,
            kind,
            order_index,
            duration_minutes: duration_minutes.filter(|m| *m > 0),
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> LessonKind {
        self.kind
    }

    #[must_use]
    pub fn order_index(&self) -> u32 {
        self.order_index
    }

    #[must_use]
    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_minutes
    }
}

//
// ─── COURSE OUTLINE ────────────────────────────────────────────────────────────
//

/// Ordered lesson list of one course.
///
/// Lessons are sorted by `order_index`, ties broken by id, so the order is
/// stable regardless of how storage returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutline {
    course_id: CourseId,
    lessons: Vec<Lesson>,
}

impl CourseOutline {
    /// # Errors
    ///
    /// Returns `LessonError::ForeignLesson` if a lesson belongs to another course.
    pub fn new(course_id: CourseId, mut lessons: Vec<Lesson>) -> Result<Self, LessonError> {
        if let Some(foreign) = lessons.iter().find(|l| l.course_id() != course_id) {
            return Err(LessonError::ForeignLesson {
                lesson: foreign.id(),
                expected: course_id,
                actual: foreign.course_id(),
            });
        }
        lessons.sort_by_key(|l| (l.order_index(), l.id()));
        Ok(Self { course_id, lessons })
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Lesson> {
        self.lessons.get(position)
    }

    /// Position of a lesson in presentation order.
    #[must_use]
    pub fn position_of(&self, lesson_id: LessonId) -> Option<usize> {
        self.lessons.iter().position(|l| l.id() == lesson_id)
    }

    /// Position after `position`, or `None` at the last lesson.
    #[must_use]
    pub fn next_position(&self, position: usize) -> Option<usize> {
        let next = position.checked_add(1)?;
        (next < self.lessons.len()).then_some(next)
    }

    /// Position before `position`, or `None` at the first lesson.
    #[must_use]
    pub fn previous_position(&self, position: usize) -> Option<usize> {
        if position >= self.lessons.len() {
            return None;
        }
        position.checked_sub(1)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
