#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod navigation;
pub mod progress_tracker;

pub use course_core::Clock;

pub use app_services::CourseServices;
pub use error::{CourseServicesError, NavigationError, ProgressError};
pub use navigation::{
    ActiveLesson, LessonContent, LessonNavigator, PendingCompletion, QuizCompletion, QuizStep,
    ReviewItem, review_items,
};
pub use progress_tracker::{CompletionOutcome, CourseProgress, LessonStatus, ProgressTracker};
