use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use course_core::model::{
    CourseId, Enrollment, EnrollmentId, Lesson, LessonId, LessonKind, LessonProgress,
    LessonProgressPatch, Question, QuestionId, Quiz, QuizId,
};
use course_core::time::{fixed_clock, fixed_now};
use course_core::{Clock, ScoreBand, SessionCommandError};
use services::{
    CourseServices, LessonContent, LessonNavigator, NavigationError, PendingCompletion,
    ProgressError, QuizStep, review_items,
};
use storage::repository::{
    EnrollmentRepository, InMemoryRepository, LessonProgressRepository, LessonRepository,
    ProgressWrite, QuizRepository, Storage, StorageError,
};

//
// ─── TEST DOUBLE ───────────────────────────────────────────────────────────────
//

/// In-memory storage whose writes can be switched to fail.
#[derive(Clone, Default)]
struct FlakyRepository {
    inner: InMemoryRepository,
    fail_progress_writes: Arc<AtomicBool>,
    fail_aggregate_updates: Arc<AtomicBool>,
}

impl FlakyRepository {
    fn check(flag: &AtomicBool) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Connection("database is locked".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LessonRepository for FlakyRepository {
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        self.inner.upsert_lesson(lesson).await
    }

    async fn get_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        self.inner.get_lessons(course_id).await
    }
}

#[async_trait]
impl QuizRepository for FlakyRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        self.inner.upsert_quiz(quiz).await
    }

    async fn get_quiz(&self, lesson_id: LessonId) -> Result<Quiz, StorageError> {
        self.inner.get_quiz(lesson_id).await
    }
}

#[async_trait]
impl EnrollmentRepository for FlakyRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        self.inner.upsert_enrollment(enrollment).await
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError> {
        self.inner.get_enrollment(id).await
    }

    async fn update_enrollment_aggregate(
        &self,
        id: EnrollmentId,
        percentage: u8,
    ) -> Result<(), StorageError> {
        Self::check(&self.fail_aggregate_updates)?;
        self.inner.update_enrollment_aggregate(id, percentage).await
    }
}

#[async_trait]
impl LessonProgressRepository for FlakyRepository {
    async fn get_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        self.inner.get_lesson_progress(enrollment_id).await
    }

    async fn upsert_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        patch: LessonProgressPatch,
    ) -> Result<ProgressWrite, StorageError> {
        Self::check(&self.fail_progress_writes)?;
        self.inner
            .upsert_lesson_progress(enrollment_id, lesson_id, patch)
            .await
    }
}

//
// ─── FIXTURES ──────────────────────────────────────────────────────────────────
//

const ENROLLMENT: EnrollmentId = EnrollmentId::new(1);

fn question(n: u128, correct: usize) -> Question {
    Question::new(
        QuestionId::new(uuid_from(n)),
        format!("Question {n}?"),
        vec!["a".into(), "b".into(), "c".into()],
        correct,
        Some(format!("Answer is option {correct}.")),
    )
    .unwrap()
}

fn uuid_from(n: u128) -> uuid::Uuid {
    uuid::Uuid::from_u128(n)
}

fn three_question_quiz(lesson_id: u64, time_limit: Option<u32>) -> Quiz {
    Quiz::new(
        QuizId::new(lesson_id),
        LessonId::new(lesson_id),
        "Checkpoint",
        None,
        vec![question(1, 0), question(2, 1), question(3, 2)],
        70,
        time_limit,
    )
    .unwrap()
}

async fn course(repo: &FlakyRepository, kinds: &[LessonKind]) {
    for (order, kind) in (0_u32..).zip(kinds) {
        let lesson = Lesson::new(
            LessonId::new(u64::from(order) + 1),
            CourseId::new(1),
            format!("Lesson {}", order + 1),
            *kind,
            order,
            Some(5),
        )
        .unwrap();
        repo.upsert_lesson(&lesson).await.unwrap();
    }
    repo.upsert_enrollment(&Enrollment::new(ENROLLMENT, CourseId::new(1)))
        .await
        .unwrap();
}

async fn navigator(repo: &FlakyRepository, clock: Clock) -> LessonNavigator {
    CourseServices::from_storage(Storage::from_repository(repo.clone()), clock)
        .navigator(ENROLLMENT)
        .await
        .unwrap()
}

async fn answer_all(nav: &mut LessonNavigator, picks: &[usize]) -> QuizStep {
    let mut last = None;
    for pick in picks {
        nav.select_answer(*pick).await.unwrap();
        last = Some(nav.advance_quiz().await.unwrap());
    }
    last.unwrap()
}

//
// ─── SCENARIOS ─────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn failing_quiz_is_still_a_completed_lesson() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Quiz, LessonKind::Text, LessonKind::Text]).await;
    repo.upsert_quiz(&three_question_quiz(1, None)).await.unwrap();
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    let step = answer_all(&mut nav, &[0, 1, 0]).await;
    let QuizStep::Completed(completion) = step else {
        panic!("expected completion, got {step:?}");
    };
    assert_eq!(completion.result.score, 67);
    assert_eq!(completion.result.correct_count, 2);
    assert!(!completion.result.passed);
    assert_eq!(completion.result.band(), ScoreBand::Good);

    let outcome = completion.saved.unwrap();
    assert!(outcome.newly_completed);
    assert_eq!(outcome.aggregate, Some(33));

    let session = nav.active().unwrap().content().quiz_session().unwrap();
    let review = review_items(session.quiz(), session.result().unwrap());
    assert_eq!(review.len(), 3);
    assert_eq!(review[2].selected, Some("a"));
    assert_eq!(review[2].correct, "c");
    assert!(!review[2].is_correct);
}

#[tokio::test]
async fn failed_save_keeps_the_score_and_can_be_retried() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Quiz, LessonKind::Text]).await;
    repo.upsert_quiz(&three_question_quiz(1, None)).await.unwrap();
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    repo.fail_progress_writes.store(true, Ordering::SeqCst);
    let QuizStep::Completed(completion) = answer_all(&mut nav, &[0, 1, 2]).await else {
        panic!("expected completion");
    };
    assert_eq!(completion.result.score, 100);
    assert!(matches!(
        completion.saved,
        Err(ProgressError::Storage(StorageError::Connection(_)))
    ));

    let active = nav.active().unwrap();
    assert_eq!(active.pending(), Some(PendingCompletion::Record));
    let session = active.content().quiz_session().unwrap();
    assert_eq!(session.result().unwrap().score, 100);
    assert!(repo.get_lesson_progress(ENROLLMENT).await.unwrap().is_empty());

    assert!(nav.retry_completion().await.is_err());
    assert_eq!(nav.active().unwrap().pending(), Some(PendingCompletion::Record));

    repo.fail_progress_writes.store(false, Ordering::SeqCst);
    let outcome = nav.retry_completion().await.unwrap().unwrap();
    assert!(outcome.newly_completed);
    assert_eq!(outcome.aggregate, Some(50));
    assert_eq!(nav.active().unwrap().pending(), None);
    assert_eq!(nav.retry_completion().await.unwrap(), None);
}

#[tokio::test]
async fn aggregate_failure_refreshes_without_rewriting_the_lesson() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Text, LessonKind::Text]).await;
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    repo.fail_aggregate_updates.store(true, Ordering::SeqCst);
    let err = nav.mark_complete().await.unwrap_err();
    assert!(matches!(
        err,
        NavigationError::Progress(ProgressError::AggregateUpdate { .. })
    ));
    assert_eq!(
        nav.active().unwrap().pending(),
        Some(PendingCompletion::RefreshAggregate)
    );
    assert_eq!(repo.get_lesson_progress(ENROLLMENT).await.unwrap().len(), 1);
    assert_eq!(
        repo.get_enrollment(ENROLLMENT).await.unwrap().progress_percentage,
        0
    );

    repo.fail_aggregate_updates.store(false, Ordering::SeqCst);
    let outcome = nav.retry_completion().await.unwrap().unwrap();
    assert_eq!(outcome.aggregate, Some(50));
    assert_eq!(
        repo.get_enrollment(ENROLLMENT).await.unwrap().progress_percentage,
        50
    );
}

#[tokio::test]
async fn duplicate_mark_complete_is_counted_once() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Text, LessonKind::Video, LessonKind::Text]).await;
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    let first = nav.mark_complete().await.unwrap();
    let second = nav.mark_complete().await.unwrap();
    assert!(first.newly_completed);
    assert!(!second.newly_completed);
    assert_eq!(second.aggregate, None);

    let records = repo.get_lesson_progress(ENROLLMENT).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].completed_at, Some(fixed_now()));

    let progress = nav.course_progress().await.unwrap();
    assert_eq!((progress.completed, progress.total), (1, 3));
    assert_eq!(progress.percentage, 33);
}

#[tokio::test]
async fn empty_and_missing_quizzes_are_reported_apart() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Quiz, LessonKind::Quiz]).await;
    let empty = Quiz::new(QuizId::new(1), LessonId::new(1), "Soon", None, vec![], 70, None)
        .unwrap();
    repo.upsert_quiz(&empty).await.unwrap();
    let mut nav = navigator(&repo, fixed_clock()).await;

    let active = nav.open_first().await.unwrap();
    assert!(matches!(active.content(), LessonContent::QuizEmpty));
    assert!(active.content().is_unavailable());
    assert!(matches!(
        nav.select_answer(0).await,
        Err(NavigationError::NoActiveQuiz)
    ));

    assert!(nav.next().await.unwrap());
    assert!(matches!(
        nav.active().unwrap().content(),
        LessonContent::QuizMissing
    ));
    assert!(matches!(
        nav.advance_quiz().await,
        Err(NavigationError::NoActiveQuiz)
    ));
    assert!(repo.get_lesson_progress(ENROLLMENT).await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_attempt_is_submitted_on_the_next_command() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Quiz]).await;
    repo.upsert_quiz(&three_question_quiz(1, Some(10))).await.unwrap();
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    nav.select_answer(0).await.unwrap();
    nav.advance_quiz().await.unwrap();

    let time_left = |nav: &LessonNavigator| match nav.active().map(|a| a.content()) {
        Some(LessonContent::Quiz(session)) => session.time_left(nav.clock().now()),
        _ => None,
    };
    nav.set_clock(Clock::fixed(fixed_now() + Duration::minutes(4)));
    assert_eq!(time_left(&nav), Some(Duration::minutes(6)));

    nav.set_clock(Clock::fixed(fixed_now() + Duration::minutes(10)));
    assert_eq!(time_left(&nav), Some(Duration::zero()));
    let QuizStep::Completed(completion) = nav.select_answer(1).await.unwrap() else {
        panic!("expected the attempt to time out");
    };
    assert!(completion.result.timed_out);
    assert_eq!(completion.result.correct_count, 1);
    assert_eq!(completion.result.score, 33);
    assert_eq!(completion.result.outcomes[1].selected, None);
    assert!(completion.saved.unwrap().newly_completed);
    assert_eq!(time_left(&nav), None);

    let err = nav.select_answer(1).await.unwrap_err();
    assert!(matches!(
        err,
        NavigationError::Command(SessionCommandError::NotPresenting)
    ));
}

#[tokio::test]
async fn leaving_a_quiz_discards_the_attempt() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Quiz, LessonKind::Text]).await;
    repo.upsert_quiz(&three_question_quiz(1, None)).await.unwrap();
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    nav.select_answer(0).await.unwrap();
    assert!(matches!(
        nav.advance_quiz().await.unwrap(),
        QuizStep::Moved { index: 1 }
    ));
    assert!(nav.next().await.unwrap());
    assert!(nav.previous().await.unwrap());

    let session = nav.active().unwrap().content().quiz_session().unwrap();
    assert_eq!(session.current_index(), Some(0));
    assert!(session.answers().is_empty());
}

#[tokio::test]
async fn retake_starts_over_and_does_not_recount_the_lesson() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Quiz, LessonKind::Text]).await;
    repo.upsert_quiz(&three_question_quiz(1, None)).await.unwrap();
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    let QuizStep::Completed(first) = answer_all(&mut nav, &[0, 1, 2]).await else {
        panic!("expected completion");
    };
    assert!(matches!(
        nav.retake_quiz().unwrap(),
        QuizStep::Restarted
    ));
    let progress = nav
        .active()
        .unwrap()
        .content()
        .quiz_session()
        .unwrap()
        .progress()
        .unwrap();
    assert_eq!((progress.position, progress.answered), (1, 0));

    let QuizStep::Completed(second) = answer_all(&mut nav, &[0, 1, 2]).await else {
        panic!("expected completion");
    };
    assert_eq!(first.result.score, second.result.score);
    assert!(!second.saved.unwrap().newly_completed);
    assert_eq!(repo.get_lesson_progress(ENROLLMENT).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_enrollment_is_rejected() {
    let services = CourseServices::from_storage(Storage::in_memory(), fixed_clock());
    let err = services.navigator(EnrollmentId::new(9)).await.unwrap_err();
    assert!(matches!(err, NavigationError::EnrollmentNotFound(_)));
}

#[tokio::test]
async fn navigator_debug_shows_position_not_storage() {
    let repo = FlakyRepository::default();
    course(&repo, &[LessonKind::Text, LessonKind::Video]).await;
    let mut nav = navigator(&repo, fixed_clock()).await;
    nav.open_first().await.unwrap();

    let shown = format!("{nav:?}");
    assert!(shown.starts_with("LessonNavigator"));
    assert!(shown.contains("lessons: 2"));
    assert!(shown.contains("enrollment_id"));
}
