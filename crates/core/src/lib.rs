#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod quiz_session;
pub mod time;

pub use error::Error;
pub use quiz_session::{
    Advance, AnswerRecord, QuestionOutcome, QuizProgress, QuizResult, QuizSession,
    QuizSessionError, ScoreBand, SessionCommandError, SessionState,
};
pub use time::Clock;
