use course_core::model::{Enrollment, EnrollmentId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_enrollment_row};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait::async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO enrollments (id, course_id, progress)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                progress = excluded.progress
            ",
        )
        .bind(id_i64("enrollment_id", enrollment.id.value())?)
        .bind(id_i64("course_id", enrollment.course_id.value())?)
        .bind(i64::from(enrollment.progress_percentage.min(100)))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, StorageError> {
        let row = sqlx::query("SELECT id, course_id, progress FROM enrollments WHERE id = ?1")
            .bind(id_i64("enrollment_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_enrollment_row(&row)
    }

    async fn update_enrollment_aggregate(
        &self,
        id: EnrollmentId,
        percentage: u8,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE enrollments SET progress = ?1 WHERE id = ?2")
            .bind(i64::from(percentage.min(100)))
            .bind(id_i64("enrollment_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
