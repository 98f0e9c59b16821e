use course_core::model::{
    CourseId, Enrollment, EnrollmentId, Lesson, LessonId, LessonKind, LessonProgress, Question,
    Quiz, QuizId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u8_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn opt_u32(row: &SqliteRow, field: &'static str) -> Result<Option<u32>, StorageError> {
    row.try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .map(|v| u32_from_i64(field, v))
        .transpose()
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    Lesson::new(
        LessonId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        kind.parse::<LessonKind>().map_err(ser)?,
        u32_from_i64("order_index", row.try_get("order_index").map_err(ser)?)?,
        opt_u32(row, "duration_minutes")?,
    )
    .map_err(ser)
}

pub(crate) fn map_quiz_row(row: &SqliteRow) -> Result<Quiz, StorageError> {
    let questions_json: String = row.try_get("questions").map_err(ser)?;
    let questions: Vec<Question> = serde_json::from_str(&questions_json).map_err(ser)?;

    Quiz::new(
        QuizId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        LessonId::new(i64_to_u64("lesson_id", row.try_get("lesson_id").map_err(ser)?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get("description").map_err(ser)?,
        questions,
        u8_from_i64("passing_score", row.try_get("passing_score").map_err(ser)?)?,
        opt_u32(row, "time_limit_minutes")?,
    )
    .map_err(ser)
}

pub(crate) fn map_enrollment_row(row: &SqliteRow) -> Result<Enrollment, StorageError> {
    Ok(Enrollment {
        id: EnrollmentId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        course_id: CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?),
        progress_percentage: u8_from_i64("progress", row.try_get("progress").map_err(ser)?)?,
    })
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    Ok(LessonProgress {
        enrollment_id: EnrollmentId::new(i64_to_u64(
            "enrollment_id",
            row.try_get("enrollment_id").map_err(ser)?,
        )?),
        lesson_id: LessonId::new(i64_to_u64("lesson_id", row.try_get("lesson_id").map_err(ser)?)?),
        completed_at: row.try_get("completed_at").map_err(ser)?,
        watched_duration_seconds: opt_u32(row, "watched_duration_seconds")?,
    })
}
