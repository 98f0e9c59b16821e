use course_core::model::{LessonId, Quiz};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_quiz_row, ser};
use crate::repository::{QuizRepository, StorageError};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let questions = serde_json::to_string(quiz.questions()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO quizzes (
                id, lesson_id, title, description, questions,
                passing_score, time_limit_minutes
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                lesson_id = excluded.lesson_id,
                title = excluded.title,
                description = excluded.description,
                questions = excluded.questions,
                passing_score = excluded.passing_score,
                time_limit_minutes = excluded.time_limit_minutes
            ",
        )
        .bind(id_i64("quiz_id", quiz.id().value())?)
        .bind(id_i64("lesson_id", quiz.lesson_id().value())?)
        .bind(quiz.title())
        .bind(quiz.description())
        .bind(questions)
        .bind(i64::from(quiz.passing_score()))
        .bind(quiz.time_limit_minutes().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;

        Ok(())
    }

    async fn get_quiz(&self, lesson_id: LessonId) -> Result<Quiz, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, lesson_id, title, description, questions,
                   passing_score, time_limit_minutes
            FROM quizzes
            WHERE lesson_id = ?1
            ",
        )
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_quiz_row(&row)
    }
}
