//! In-memory state machine for a single quiz attempt.
//!
//! A session is either presenting one question or completed with a result.
//! Commands that are not valid in the current state are rejected with a
//! `SessionCommandError` and leave the session untouched.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{QuestionId, Quiz, percentage};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A session cannot be started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizSessionError {
    #[error("quiz has no questions")]
    EmptyQuiz,
}

/// A command was rejected; the session state is unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionCommandError {
    #[error("quiz attempt is already completed")]
    NotPresenting,

    #[error("option {index} is out of range for {len} options")]
    OptionOutOfRange { index: usize, len: usize },

    #[error("question {position} has not been answered")]
    Unanswered { position: usize },

    #[error("already at the first question")]
    AtFirstQuestion,
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// Selected option per question. Entries are overwritten, never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerRecord {
    selections: HashMap<QuestionId, usize>,
}

impl AnswerRecord {
    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<usize> {
        self.selections.get(&question_id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.selections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    fn select(&mut self, question_id: QuestionId, option: usize) {
        self.selections.insert(question_id, option);
    }
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// Feedback band shown next to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Excellent,
    Good,
    KeepStudying,
}

impl ScoreBand {
    #[must_use]
    pub fn for_score(score: u8) -> Self {
        match score {
            80.. => Self::Excellent,
            60..=79 => Self::Good,
            _ => Self::KeepStudying,
        }
    }
}

/// Correctness of one question in a submitted attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub selected: Option<usize>,
    pub correct_index: usize,
    pub is_correct: bool,
}

/// Final result of a submitted attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResult {
    pub score: u8,
    pub correct_count: usize,
    pub total: usize,
    pub passed: bool,
    pub outcomes: Vec<QuestionOutcome>,
    pub submitted_at: DateTime<Utc>,
    /// The attempt was submitted because its time limit ran out.
    pub timed_out: bool,
}

impl QuizResult {
    #[must_use]
    pub fn band(&self) -> ScoreBand {
        ScoreBand::for_score(self.score)
    }
}

/// Score an attempt against a quiz. Unanswered questions count as incorrect.
#[must_use]
pub fn score_attempt(
    quiz: &Quiz,
    answers: &AnswerRecord,
    submitted_at: DateTime<Utc>,
    timed_out: bool,
) -> QuizResult {
    let outcomes: Vec<QuestionOutcome> = quiz
        .questions()
        .iter()
        .map(|question| {
            let selected = answers.get(question.id());
            QuestionOutcome {
                question_id: question.id(),
                selected,
                correct_index: question.correct_index(),
                is_correct: selected.is_some_and(|s| question.is_correct(s)),
            }
        })
        .collect();

    let correct_count = outcomes.iter().filter(|o| o.is_correct).count();
    let score = percentage(correct_count, quiz.len());

    QuizResult {
        score,
        correct_count,
        total: quiz.len(),
        passed: quiz.is_passing(score),
        outcomes,
        submitted_at,
        timed_out,
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Presenting { index: usize },
    Completed(QuizResult),
}

/// Outcome of a successful `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Moved { index: usize },
    Completed(QuizResult),
}

/// Position indicator while a question is being presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizProgress {
    /// 1-based position of the current question.
    pub position: usize,
    pub total: usize,
    pub percent: u8,
    pub answered: usize,
    pub can_advance: bool,
    pub can_retreat: bool,
    /// Advancing from here submits the attempt.
    pub is_last: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

pub struct QuizSession {
    quiz: Arc<Quiz>,
    state: SessionState,
    answers: AnswerRecord,
    started_at: DateTime<Utc>,
}

impl QuizSession {
    /// Start a fresh attempt at the first question.
    ///
    /// `started_at` should come from the services layer clock; it anchors the
    /// time limit, if the quiz has one.
    ///
    /// # Errors
    ///
    /// Returns `QuizSessionError::EmptyQuiz` if the quiz has no questions.
    pub fn start(quiz: Arc<Quiz>, started_at: DateTime<Utc>) -> Result<Self, QuizSessionError> {
        if quiz.is_empty() {
            return Err(QuizSessionError::EmptyQuiz);
        }
        Ok(Self {
            quiz,
            state: SessionState::Presenting { index: 0 },
            answers: AnswerRecord::default(),
            started_at,
        })
    }

    #[must_use]
    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerRecord {
        &self.answers
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            SessionState::Presenting { index } => Some(index),
            SessionState::Completed(_) => None,
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&crate::model::Question> {
        self.current_index().and_then(|i| self.quiz.question(i))
    }

    /// Option selected for the question currently presented.
    #[must_use]
    pub fn current_selection(&self) -> Option<usize> {
        self.current_question()
            .and_then(|q| self.answers.get(q.id()))
    }

    #[must_use]
    pub fn result(&self) -> Option<&QuizResult> {
        match &self.state {
            SessionState::Completed(result) => Some(result),
            SessionState::Presenting { .. } => None,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, SessionState::Completed(_))
    }

    #[must_use]
    pub fn progress(&self) -> Option<QuizProgress> {
        let index = self.current_index()?;
        let total = self.quiz.len();
        let can_advance = self.current_selection().is_some();
        Some(QuizProgress {
            position: index + 1,
            total,
            percent: percentage(index + 1, total),
            answered: self.answers.len(),
            can_advance,
            can_retreat: index > 0,
            is_last: index + 1 == total,
        })
    }

    /// When the time limit runs out, if the quiz has one.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.quiz.time_limit().map(|limit| self.started_at + limit)
    }

    /// Time remaining before the deadline, never negative. `None` without a
    /// time limit or once the attempt is complete.
    #[must_use]
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_complete() {
            return None;
        }
        self.deadline()
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Record `option` for the current question, replacing any prior selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionCommandError::NotPresenting` after completion, or
    /// `OptionOutOfRange` if `option` is not an index into the options.
    pub fn select_answer(&mut self, option: usize) -> Result<(), SessionCommandError> {
        let question = self
            .current_question()
            .ok_or(SessionCommandError::NotPresenting)?;
        let len = question.options().len();
        if option >= len {
            return Err(SessionCommandError::OptionOutOfRange { index: option, len });
        }
        let id = question.id();
        self.answers.select(id, option);
        Ok(())
    }

    /// Move to the next question, or submit the attempt from the last one.
    ///
    /// The result is handed out exactly once, on the transition to completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionCommandError::Unanswered` if the current question has
    /// no selection, or `NotPresenting` after completion.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Advance, SessionCommandError> {
        let SessionState::Presenting { index } = self.state else {
            return Err(SessionCommandError::NotPresenting);
        };
        if self.current_selection().is_none() {
            return Err(SessionCommandError::Unanswered {
                position: index + 1,
            });
        }

        if index + 1 < self.quiz.len() {
            self.state = SessionState::Presenting { index: index + 1 };
            Ok(Advance::Moved { index: index + 1 })
        } else {
            Ok(Advance::Completed(self.complete(now, false)))
        }
    }

    /// Step back one question. Answers are kept.
    ///
    /// # Errors
    ///
    /// Returns `SessionCommandError::AtFirstQuestion` at the first question, or
    /// `NotPresenting` after completion.
    pub fn retreat(&mut self) -> Result<usize, SessionCommandError> {
        let SessionState::Presenting { index } = self.state else {
            return Err(SessionCommandError::NotPresenting);
        };
        let previous = index
            .checked_sub(1)
            .ok_or(SessionCommandError::AtFirstQuestion)?;
        self.state = SessionState::Presenting { index: previous };
        Ok(previous)
    }

    /// Submit the attempt if its time limit has run out.
    ///
    /// Returns the result only when this call performed the submission.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<QuizResult> {
        if self.is_complete() || !self.is_expired(now) {
            return None;
        }
        Some(self.complete(now, true))
    }

    /// Discard all answers and start over at the first question.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.answers = AnswerRecord::default();
        self.state = SessionState::Presenting { index: 0 };
        self.started_at = now;
    }

    fn complete(&mut self, now: DateTime<Utc>, timed_out: bool) -> QuizResult {
        let result = score_attempt(&self.quiz, &self.answers, now, timed_out);
        self.state = SessionState::Completed(result.clone());
        result
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("quiz_id", &self.quiz.id())
            .field("questions", &self.quiz.len())
            .field("state", &self.state)
            .field("answered", &self.answers.len())
            .field("started_at", &self.started_at)
            .finish()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LessonId, Question, QuizId};
    use crate::time::fixed_now;

    fn quiz_with(correct: &[usize], time_limit: Option<u32>) -> Arc<Quiz> {
        let questions = correct
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Question::new(
                    QuestionId::random(),
                    format!("Question {i}"),
                    vec!["a".into(), "b".into(), "c".into()],
                    *c,
                    None,
                )
                .unwrap()
            })
            .collect();
        Arc::new(
            Quiz::new(
                QuizId::new(1),
                LessonId::new(1),
                "Quiz",
                None,
                questions,
                70,
                time_limit,
            )
            .unwrap(),
        )
    }

    fn answer_all(session: &mut QuizSession, picks: &[usize]) -> QuizResult {
        for pick in picks {
            session.select_answer(*pick).unwrap();
            if let Advance::Completed(result) = session.advance(fixed_now()).unwrap() {
                return result;
            }
        }
        panic!("session did not complete");
    }

    #[test]
    fn empty_quiz_cannot_start() {
        let err = QuizSession::start(quiz_with(&[], None), fixed_now()).unwrap_err();
        assert_eq!(err, QuizSessionError::EmptyQuiz);
    }

    #[test]
    fn scores_two_of_three() {
        let mut session = QuizSession::start(quiz_with(&[0, 2, 1], None), fixed_now()).unwrap();
        let result = answer_all(&mut session, &[0, 2, 0]);

        assert_eq!(result.score, 67);
        assert_eq!(result.correct_count, 2);
        assert!(!result.passed);
        assert_eq!(result.band(), ScoreBand::Good);
        assert!(!result.outcomes[2].is_correct);
        assert_eq!(session.result(), Some(&result));
    }

    #[test]
    fn advance_requires_an_answer_at_every_position() {
        let mut session = QuizSession::start(quiz_with(&[0, 0, 0], None), fixed_now()).unwrap();
        for position in 0..3 {
            let before = session.state().clone();
            let err = session.advance(fixed_now()).unwrap_err();
            assert_eq!(err, SessionCommandError::Unanswered { position: position + 1 });
            assert_eq!(session.state(), &before);
            session.select_answer(1).unwrap();
            session.advance(fixed_now()).unwrap();
        }
        assert!(session.is_complete());
    }

    #[test]
    fn out_of_range_selection_is_rejected_without_side_effects() {
        let mut session = QuizSession::start(quiz_with(&[0, 0], None), fixed_now()).unwrap();
        let err = session.select_answer(3).unwrap_err();
        assert_eq!(err, SessionCommandError::OptionOutOfRange { index: 3, len: 3 });
        assert!(session.answers().is_empty());
        assert_eq!(session.current_index(), Some(0));
    }

    #[test]
    fn retreat_keeps_answers_and_allows_changes() {
        let quiz = quiz_with(&[0, 1, 2], None);
        let mut session = QuizSession::start(Arc::clone(&quiz), fixed_now()).unwrap();

        assert_eq!(session.retreat(), Err(SessionCommandError::AtFirstQuestion));

        session.select_answer(1).unwrap();
        session.advance(fixed_now()).unwrap();
        session.select_answer(1).unwrap();
        assert_eq!(session.retreat(), Ok(0));
        assert_eq!(session.current_selection(), Some(1));

        session.select_answer(0).unwrap();
        session.advance(fixed_now()).unwrap();
        assert_eq!(session.current_selection(), Some(1));
        session.advance(fixed_now()).unwrap();

        let q = quiz.questions();
        assert_eq!(session.answers().get(q[0].id()), Some(0));
        assert_eq!(session.answers().get(q[1].id()), Some(1));
        assert_eq!(session.current_index(), Some(2));
    }

    #[test]
    fn result_is_reported_once() {
        let mut session = QuizSession::start(quiz_with(&[0], None), fixed_now()).unwrap();
        session.select_answer(0).unwrap();
        assert!(matches!(
            session.advance(fixed_now()),
            Ok(Advance::Completed(_))
        ));
        assert_eq!(
            session.advance(fixed_now()),
            Err(SessionCommandError::NotPresenting)
        );
        assert_eq!(session.select_answer(0), Err(SessionCommandError::NotPresenting));
        assert_eq!(session.retreat(), Err(SessionCommandError::NotPresenting));
    }

    #[test]
    fn reset_reproduces_the_same_score() {
        let mut session = QuizSession::start(quiz_with(&[0, 2, 1, 1], None), fixed_now()).unwrap();
        let first = answer_all(&mut session, &[0, 1, 1, 2]);

        session.reset(fixed_now());
        assert!(session.answers().is_empty());
        assert_eq!(session.current_index(), Some(0));

        let second = answer_all(&mut session, &[0, 1, 1, 2]);
        assert_eq!(first, second);
        assert_eq!(second.score, 50);
    }

    #[test]
    fn score_counts_only_matching_answers() {
        let quiz = quiz_with(&[0, 1, 2, 0, 1], None);
        let ids: Vec<_> = quiz.questions().iter().map(Question::id).collect();
        for mask in 0_u32..(1 << 5) {
            let mut answers = AnswerRecord::default();
            let mut expected = 0;
            for (i, id) in ids.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    let pick = quiz.questions()[i].correct_index();
                    answers.select(*id, if i % 2 == 0 { pick } else { (pick + 1) % 3 });
                    if i % 2 == 0 {
                        expected += 1;
                    }
                }
            }
            let result = score_attempt(&quiz, &answers, fixed_now(), false);
            assert_eq!(result.correct_count, expected);
            assert_eq!(result.score, percentage(expected, 5));
        }
    }

    #[test]
    fn progress_tracks_position() {
        let mut session = QuizSession::start(quiz_with(&[0, 0, 0, 0], None), fixed_now()).unwrap();
        let p = session.progress().unwrap();
        assert_eq!((p.position, p.total, p.percent), (1, 4, 25));
        assert!(!p.can_advance && !p.can_retreat && !p.is_last);

        session.select_answer(0).unwrap();
        assert!(session.progress().unwrap().can_advance);
        for _ in 0..3 {
            session.select_answer(0).unwrap();
            session.advance(fixed_now()).unwrap();
        }
        let p = session.progress().unwrap();
        assert_eq!((p.position, p.percent), (4, 100));
        assert!(p.is_last && p.can_retreat);
    }

    #[test]
    fn expiry_submits_with_current_answers() {
        let start = fixed_now();
        let mut session = QuizSession::start(quiz_with(&[0, 0], Some(10)), start).unwrap();
        session.select_answer(0).unwrap();

        assert_eq!(session.expire(start + Duration::minutes(9)), None);
        let result = session.expire(start + Duration::minutes(10)).unwrap();
        assert!(result.timed_out);
        assert_eq!(result.score, 50);
        assert_eq!(session.expire(start + Duration::minutes(11)), None);
    }

    #[test]
    fn time_left_counts_down_from_the_injected_now() {
        let start = fixed_now();
        let mut session = QuizSession::start(quiz_with(&[0, 0], Some(10)), start).unwrap();

        assert_eq!(session.time_left(start), Some(Duration::minutes(10)));
        assert_eq!(
            session.time_left(start + Duration::minutes(4)),
            Some(Duration::minutes(6))
        );
        assert_eq!(
            session.time_left(start + Duration::minutes(15)),
            Some(Duration::zero())
        );

        session.expire(start + Duration::minutes(15));
        assert_eq!(session.time_left(start), None);
    }

    #[test]
    fn untimed_quiz_never_expires() {
        let mut session = QuizSession::start(quiz_with(&[0], None), fixed_now()).unwrap();
        assert_eq!(session.deadline(), None);
        assert_eq!(session.time_left(fixed_now()), None);
        assert_eq!(session.expire(fixed_now() + Duration::days(365)), None);
    }

    #[test]
    fn score_bands() {
        assert_eq!(ScoreBand::for_score(100), ScoreBand::Excellent);
        assert_eq!(ScoreBand::for_score(80), ScoreBand::Excellent);
        assert_eq!(ScoreBand::for_score(60), ScoreBand::Good);
        assert_eq!(ScoreBand::for_score(59), ScoreBand::KeepStudying);
    }
}
