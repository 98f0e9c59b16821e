use course_core::model::{CourseId, Lesson};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_lesson_row};
use crate::repository::{LessonRepository, StorageError};

#[async_trait::async_trait]
impl LessonRepository for SqliteRepository {
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lessons (id, course_id, title, kind, order_index, duration_minutes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                kind = excluded.kind,
                order_index = excluded.order_index,
                duration_minutes = excluded.duration_minutes
            ",
        )
        .bind(id_i64("lesson_id", lesson.id().value())?)
        .bind(id_i64("course_id", lesson.course_id().value())?)
        .bind(lesson.title())
        .bind(lesson.kind().as_str())
        .bind(i64::from(lesson.order_index()))
        .bind(lesson.duration_minutes().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_lessons(&self, course_id: CourseId) -> Result<Vec<Lesson>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, kind, order_index, duration_minutes
            FROM lessons
            WHERE course_id = ?1
            ORDER BY order_index ASC, id ASC
            ",
        )
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_lesson_row).collect()
    }
}
