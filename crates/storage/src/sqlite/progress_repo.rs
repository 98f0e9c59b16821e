use course_core::model::{EnrollmentId, LessonId, LessonProgress, LessonProgressPatch};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_progress_row};
use crate::repository::{LessonProgressRepository, ProgressWrite, StorageError};

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn get_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT enrollment_id, lesson_id, completed_at, watched_duration_seconds
            FROM lesson_progress
            WHERE enrollment_id = ?1
            ORDER BY lesson_id ASC
            ",
        )
        .bind(id_i64("enrollment_id", enrollment_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn upsert_lesson_progress(
        &self,
        enrollment_id: EnrollmentId,
        lesson_id: LessonId,
        patch: LessonProgressPatch,
    ) -> Result<ProgressWrite, StorageError> {
        let enrollment = id_i64("enrollment_id", enrollment_id.value())?;
        let lesson = id_i64("lesson_id", lesson_id.value())?;

        // Every branch starts with a write, so the transaction holds the
        // write lock before the record is read back.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let mut newly_completed = false;
        if let Some(completed_at) = patch.completed_at {
            let res = sqlx::query(
                r"
                INSERT INTO lesson_progress (enrollment_id, lesson_id, completed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(enrollment_id, lesson_id) DO UPDATE SET
                    completed_at = excluded.completed_at
                WHERE lesson_progress.completed_at IS NULL
                ",
            )
            .bind(enrollment)
            .bind(lesson)
            .bind(completed_at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            newly_completed = res.rows_affected() == 1;
        }

        if let Some(seconds) = patch.watched_duration_seconds {
            sqlx::query(
                r"
                INSERT INTO lesson_progress (enrollment_id, lesson_id, watched_duration_seconds)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(enrollment_id, lesson_id) DO UPDATE SET
                    watched_duration_seconds = excluded.watched_duration_seconds
                ",
            )
            .bind(enrollment)
            .bind(lesson)
            .bind(i64::from(seconds))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        if patch.completed_at.is_none() && patch.watched_duration_seconds.is_none() {
            sqlx::query(
                r"
                INSERT INTO lesson_progress (enrollment_id, lesson_id)
                VALUES (?1, ?2)
                ON CONFLICT(enrollment_id, lesson_id) DO NOTHING
                ",
            )
            .bind(enrollment)
            .bind(lesson)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        let row = sqlx::query(
            r"
            SELECT enrollment_id, lesson_id, completed_at, watched_duration_seconds
            FROM lesson_progress
            WHERE enrollment_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(enrollment)
        .bind(lesson)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let record = map_progress_row(&row)?;

        tx.commit().await.map_err(conn)?;

        tracing::debug!(
            enrollment_id = %enrollment_id,
            lesson_id = %lesson_id,
            newly_completed,
            "lesson progress written"
        );

        Ok(ProgressWrite {
            record,
            newly_completed,
        })
    }
}
