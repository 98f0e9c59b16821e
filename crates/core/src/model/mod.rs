mod ids;
mod lesson;
mod progress;
mod quiz;

pub use ids::{CourseId, EnrollmentId, LessonId, ParseIdError, QuestionId, QuizId};
pub use lesson::{CourseOutline, Lesson, LessonError, LessonKind};
pub use progress::{Enrollment, LessonProgress, LessonProgressPatch, percentage};
pub use quiz::{Question, QuestionError, Quiz, QuizError};
