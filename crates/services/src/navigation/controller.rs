use std::fmt;
use std::sync::Arc;

use course_core::model::{CourseOutline, EnrollmentId, Lesson, LessonId, LessonKind};
use course_core::{Advance, Clock, QuizResult, QuizSession, QuizSessionError};
use storage::repository::{EnrollmentRepository, LessonRepository, QuizRepository, StorageError};

use super::view::{ActiveLesson, LessonContent, PendingCompletion, QuizCompletion, QuizStep};
use crate::error::{NavigationError, ProgressError};
use crate::progress_tracker::{CompletionOutcome, CourseProgress, ProgressTracker};

/// Drives one learner through one course.
///
/// Holds the ordered lesson list, the lesson on screen and, for quiz lessons,
/// the live attempt. Completion signals are forwarded to `ProgressTracker`.
pub struct LessonNavigator {
    clock: Clock,
    enrollment_id: EnrollmentId,
    outline: CourseOutline,
    quizzes: Arc<dyn QuizRepository>,
    tracker: ProgressTracker,
    active: Option<ActiveLesson>,
}

impl LessonNavigator {
    /// Load the course outline for an enrollment. No lesson is open yet.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::EnrollmentNotFound` for an unknown enrollment,
    /// or `Storage`/`Outline` if the lessons cannot be loaded.
    pub async fn load(
        clock: Clock,
        enrollment_id: EnrollmentId,
        enrollments: &dyn EnrollmentRepository,
        lessons: &dyn LessonRepository,
        quizzes: Arc<dyn QuizRepository>,
        tracker: ProgressTracker,
    ) -> Result<Self, NavigationError> {
        let enrollment = match enrollments.get_enrollment(enrollment_id).await {
            Ok(enrollment) => enrollment,
            Err(StorageError::NotFound) => {
                return Err(NavigationError::EnrollmentNotFound(enrollment_id));
            }
            Err(err) => return Err(err.into()),
        };
        let outline = CourseOutline::new(
            enrollment.course_id,
            lessons.get_lessons(enrollment.course_id).await?,
        )?;

        tracing::debug!(
            enrollment_id = %enrollment_id,
            course_id = %outline.course_id(),
            lessons = outline.len(),
            "course outline loaded"
        );

        Ok(Self {
            clock,
            enrollment_id,
            outline,
            quizzes,
            tracker,
            active: None,
        })
    }

    #[must_use]
    pub fn enrollment_id(&self) -> EnrollmentId {
        self.enrollment_id
    }

    #[must_use]
    pub fn outline(&self) -> &CourseOutline {
        &self.outline
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveLesson> {
        self.active.as_ref()
    }

    /// Time source for completion stamps and quiz deadlines.
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Replace the time source used for completion stamps and quiz deadlines.
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Display a lesson by id. Any quiz attempt in progress is discarded.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::LessonNotFound` if the lesson is not in this
    /// course, or `Storage` if its quiz cannot be loaded. The previously open
    /// lesson stays open on error.
    pub async fn open(&mut self, lesson_id: LessonId) -> Result<&ActiveLesson, NavigationError> {
        let position = self
            .outline
            .position_of(lesson_id)
            .ok_or(NavigationError::LessonNotFound(lesson_id))?;
        self.open_position(position).await
    }

    /// Display the first lesson of the course.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::EmptyCourse` if the course has no lessons.
    pub async fn open_first(&mut self) -> Result<&ActiveLesson, NavigationError> {
        if self.outline.is_empty() {
            return Err(NavigationError::EmptyCourse(self.outline.course_id()));
        }
        self.open_position(0).await
    }

    /// Move to the following lesson. Returns `false` at the last lesson.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoLessonOpen` before any lesson is opened.
    pub async fn next(&mut self) -> Result<bool, NavigationError> {
        let position = self.current_position()?;
        match self.outline.next_position(position) {
            Some(next) => {
                self.open_position(next).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move to the preceding lesson. Returns `false` at the first lesson.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoLessonOpen` before any lesson is opened.
    pub async fn previous(&mut self) -> Result<bool, NavigationError> {
        let position = self.current_position()?;
        match self.outline.previous_position(position) {
            Some(previous) => {
                self.open_position(previous).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn open_position(&mut self, position: usize) -> Result<&ActiveLesson, NavigationError> {
        let lesson = self
            .outline
            .get(position)
            .cloned()
            .ok_or(NavigationError::EmptyCourse(self.outline.course_id()))?;
        let content = self.load_content(&lesson).await?;

        tracing::debug!(
            enrollment_id = %self.enrollment_id,
            lesson_id = %lesson.id(),
            kind = %lesson.kind(),
            position,
            "lesson opened"
        );

        Ok(&*self.active.insert(ActiveLesson {
            position,
            lesson,
            content,
            pending: None,
        }))
    }

    async fn load_content(&self, lesson: &Lesson) -> Result<LessonContent, NavigationError> {
        match lesson.kind() {
            LessonKind::Video => Ok(LessonContent::Video),
            LessonKind::Text => Ok(LessonContent::Text),
            LessonKind::Quiz => match self.quizzes.get_quiz(lesson.id()).await {
                Ok(quiz) => match QuizSession::start(Arc::new(quiz), self.clock.now()) {
                    Ok(session) => Ok(LessonContent::Quiz(session)),
                    Err(QuizSessionError::EmptyQuiz) => Ok(LessonContent::QuizEmpty),
                    Err(err) => Err(err.into()),
                },
                Err(StorageError::NotFound) => Ok(LessonContent::QuizMissing),
                Err(err) => Err(err.into()),
            },
        }
    }

    fn current_position(&self) -> Result<usize, NavigationError> {
        self.active
            .as_ref()
            .map(ActiveLesson::position)
            .ok_or(NavigationError::NoLessonOpen)
    }

    fn active_of_kind(&self, expected: LessonKind) -> Result<LessonId, NavigationError> {
        let active = self.active.as_ref().ok_or(NavigationError::NoLessonOpen)?;
        let actual = active.lesson.kind();
        if actual != expected {
            return Err(NavigationError::WrongLessonKind { expected, actual });
        }
        Ok(active.lesson.id())
    }

    //
    // ─── PASSIVE LESSONS ───────────────────────────────────────────────────────
    //

    /// Explicit "mark complete" on a text lesson.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::WrongLessonKind` unless a text lesson is open,
    /// or `Progress` if the completion was not saved.
    pub async fn mark_complete(&mut self) -> Result<CompletionOutcome, NavigationError> {
        let lesson_id = self.active_of_kind(LessonKind::Text)?;
        Ok(self.record_completion(lesson_id).await?)
    }

    /// Playback of the open video reached its end.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::WrongLessonKind` unless a video lesson is
    /// open, or `Progress` if the completion was not saved.
    pub async fn video_ended(&mut self) -> Result<CompletionOutcome, NavigationError> {
        let lesson_id = self.active_of_kind(LessonKind::Video)?;
        Ok(self.record_completion(lesson_id).await?)
    }

    /// Progress ping from the video player.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::WrongLessonKind` unless a video lesson is
    /// open, or `Progress` if the write fails.
    pub async fn video_progress(&mut self, seconds: u32) -> Result<(), NavigationError> {
        let lesson_id = self.active_of_kind(LessonKind::Video)?;
        self.tracker
            .record_watch_progress(self.enrollment_id, lesson_id, seconds)
            .await?;
        Ok(())
    }

    //
    // ─── QUIZ ──────────────────────────────────────────────────────────────────
    //

    /// Select an option for the current question.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::Command` if the engine rejects the selection,
    /// or `NoActiveQuiz`/`WrongLessonKind` without a running quiz.
    pub async fn select_answer(&mut self, option: usize) -> Result<QuizStep, NavigationError> {
        let now = self.clock.now();
        let (lesson_id, session) = self.quiz_session_mut()?;
        if let Some(result) = session.expire(now) {
            return Ok(self.finish_quiz(lesson_id, result).await);
        }
        session.select_answer(option)?;
        Ok(QuizStep::Selected { option })
    }

    /// Move to the next question, submitting the attempt from the last one.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::Command` if the current question is
    /// unanswered or the attempt is already complete.
    pub async fn advance_quiz(&mut self) -> Result<QuizStep, NavigationError> {
        let now = self.clock.now();
        let (lesson_id, session) = self.quiz_session_mut()?;
        if let Some(result) = session.expire(now) {
            return Ok(self.finish_quiz(lesson_id, result).await);
        }
        match session.advance(now)? {
            Advance::Moved { index } => Ok(QuizStep::Moved { index }),
            Advance::Completed(result) => Ok(self.finish_quiz(lesson_id, result).await),
        }
    }

    /// Step back one question.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::Command` at the first question or after
    /// completion.
    pub async fn retreat_quiz(&mut self) -> Result<QuizStep, NavigationError> {
        let now = self.clock.now();
        let (lesson_id, session) = self.quiz_session_mut()?;
        if let Some(result) = session.expire(now) {
            return Ok(self.finish_quiz(lesson_id, result).await);
        }
        let index = session.retreat()?;
        Ok(QuizStep::Retreated { index })
    }

    /// Throw the current attempt away and start a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveQuiz`/`WrongLessonKind` without a running quiz.
    pub fn retake_quiz(&mut self) -> Result<QuizStep, NavigationError> {
        let now = self.clock.now();
        self.quiz_session_mut()?.1.reset(now);
        tracing::debug!(enrollment_id = %self.enrollment_id, "quiz attempt restarted");
        Ok(QuizStep::Restarted)
    }

    fn quiz_session_mut(&mut self) -> Result<(LessonId, &mut QuizSession), NavigationError> {
        let active = self.active.as_mut().ok_or(NavigationError::NoLessonOpen)?;
        let actual = active.lesson.kind();
        match &mut active.content {
            LessonContent::Quiz(session) => Ok((active.lesson.id(), session)),
            LessonContent::QuizEmpty | LessonContent::QuizMissing => {
                Err(NavigationError::NoActiveQuiz)
            }
            LessonContent::Video | LessonContent::Text => Err(NavigationError::WrongLessonKind {
                expected: LessonKind::Quiz,
                actual,
            }),
        }
    }

    async fn finish_quiz(&mut self, lesson_id: LessonId, result: QuizResult) -> QuizStep {
        tracing::info!(
            enrollment_id = %self.enrollment_id,
            lesson_id = %lesson_id,
            score = result.score,
            passed = result.passed,
            timed_out = result.timed_out,
            "quiz submitted"
        );
        let saved = self.record_completion(lesson_id).await;
        QuizStep::Completed(QuizCompletion { result, saved })
    }

    //
    // ─── COMPLETION ────────────────────────────────────────────────────────────
    //

    /// Finish a completion of the open lesson that failed to save.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoLessonOpen` without an open lesson, or
    /// `Progress` if the retry fails too. The completion stays pending then.
    pub async fn retry_completion(&mut self) -> Result<Option<CompletionOutcome>, NavigationError> {
        let active = self.active.as_ref().ok_or(NavigationError::NoLessonOpen)?;
        let lesson_id = active.lesson.id();
        match active.pending {
            None => Ok(None),
            Some(PendingCompletion::Record) => Ok(Some(self.record_completion(lesson_id).await?)),
            Some(PendingCompletion::RefreshAggregate) => {
                let aggregate = self.tracker.refresh_aggregate(self.enrollment_id).await?;
                self.set_pending(lesson_id, None);
                Ok(Some(CompletionOutcome {
                    lesson_id,
                    newly_completed: true,
                    aggregate: Some(aggregate),
                }))
            }
        }
    }

    /// Lesson list with completion flags for this enrollment.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::Progress` if progress cannot be read.
    pub async fn course_progress(&self) -> Result<CourseProgress, NavigationError> {
        Ok(self.tracker.course_progress(self.enrollment_id).await?)
    }

    async fn record_completion(
        &mut self,
        lesson_id: LessonId,
    ) -> Result<CompletionOutcome, ProgressError> {
        let saved = self
            .tracker
            .record_lesson_complete(self.enrollment_id, lesson_id)
            .await;
        let pending = match &saved {
            Ok(_) => None,
            Err(ProgressError::AggregateUpdate { .. }) => Some(PendingCompletion::RefreshAggregate),
            Err(_) => Some(PendingCompletion::Record),
        };
        if let Err(err) = &saved {
            tracing::warn!(
                enrollment_id = %self.enrollment_id,
                lesson_id = %lesson_id,
                error = %err,
                "lesson completion not saved"
            );
        }
        self.set_pending(lesson_id, pending);
        saved
    }

    fn set_pending(&mut self, lesson_id: LessonId, pending: Option<PendingCompletion>) {
        if let Some(active) = self.active.as_mut().filter(|a| a.lesson.id() == lesson_id) {
            active.pending = pending;
        }
    }
}

impl fmt::Debug for LessonNavigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LessonNavigator")
            .field("enrollment_id", &self.enrollment_id)
            .field("course_id", &self.outline.course_id())
            .field("lessons", &self.outline.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
