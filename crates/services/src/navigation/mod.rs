mod controller;
mod view;

// Public API of the navigation subsystem.
pub use crate::error::NavigationError;
pub use controller::LessonNavigator;
pub use view::{
    ActiveLesson, LessonContent, PendingCompletion, QuizCompletion, QuizStep, ReviewItem,
    review_items,
};
