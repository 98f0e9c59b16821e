use clap::Parser;
use course_core::model::{
    CourseId, Enrollment, EnrollmentId, Lesson, LessonId, LessonKind, Question, QuestionId, Quiz,
    QuizId,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Seed a demo course with one lesson of each kind and an enrollment.
#[derive(Debug, Parser)]
#[command(name = "seed", version)]
struct Args {
    /// SQLite URL
    #[arg(long = "db", env = "COURSE_DB_URL", default_value = "sqlite://dev.sqlite3?mode=rwc")]
    db_url: String,

    /// Course to create lessons in
    #[arg(long, default_value_t = 1)]
    course_id: u64,

    /// Enrollment to create for the course
    #[arg(long, env = "COURSE_ENROLLMENT_ID", default_value_t = 1)]
    enrollment_id: u64,

    /// Optional time limit for the demo quiz, in minutes
    #[arg(long)]
    time_limit: Option<u32>,
}

const LESSON_COUNT: u64 = 4;

fn question(
    n: u128,
    prompt: &str,
    options: &[&str],
    correct: usize,
    explanation: Option<&str>,
) -> Result<Question, course_core::Error> {
    Ok(Question::new(
        QuestionId::new(Uuid::from_u128(n)),
        prompt,
        options.iter().map(|o| (*o).to_string()).collect(),
        correct,
        explanation.map(str::to_string),
    )?)
}

/// First lesson id of a seeded course; each course owns a block of 100 ids.
fn lesson_id_base(course_id: u64) -> Option<u64> {
    let base = course_id.checked_mul(100)?;
    base.checked_add(LESSON_COUNT).map(|_| base)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let storage = Storage::sqlite(&args.db_url).await?;
    let course_id = CourseId::new(args.course_id);
    let base = lesson_id_base(args.course_id)
        .ok_or_else(|| format!("course id {} is too large to seed", args.course_id))?;

    let lessons = [
        ("Welcome", LessonKind::Video, Some(5)),
        ("Ownership basics", LessonKind::Text, Some(10)),
        ("Check your understanding", LessonKind::Quiz, None),
        ("Borrowing in depth", LessonKind::Text, Some(15)),
    ];
    for (order, (title, kind, minutes)) in (0_u32..).zip(lessons) {
        let lesson = Lesson::new(
            LessonId::new(base + u64::from(order) + 1),
            course_id,
            title,
            kind,
            order,
            minutes,
        )?;
        storage.lessons.upsert_lesson(&lesson).await?;
    }

    let questions = vec![
        question(
            1,
            "Which keyword moves ownership into a closure?",
            &["ref", "move", "static", "own"],
            1,
            Some("`move` forces the closure to take ownership of captured values."),
        )?,
        question(
            2,
            "How many mutable borrows of a value may exist at once?",
            &["Any number", "Two", "One", "None"],
            2,
            None,
        )?,
        question(
            3,
            "What happens when an owner goes out of scope?",
            &["The value is dropped", "Nothing", "A panic"],
            0,
            None,
        )?,
    ];
    let quiz = Quiz::new(
        QuizId::new(args.course_id),
        LessonId::new(base + 3),
        "Ownership quiz",
        None,
        questions,
        Quiz::DEFAULT_PASSING_SCORE,
        args.time_limit,
    )?;
    storage.quizzes.upsert_quiz(&quiz).await?;

    let enrollment_id = EnrollmentId::new(args.enrollment_id);
    match storage.enrollments.get_enrollment(enrollment_id).await {
        Ok(existing) => {
            tracing::info!(enrollment_id = %existing.id, "enrollment already present");
        }
        Err(storage::repository::StorageError::NotFound) => {
            storage
                .enrollments
                .upsert_enrollment(&Enrollment::new(enrollment_id, course_id))
                .await?;
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(
        course_id = %course_id,
        enrollment_id = %enrollment_id,
        lessons = lessons.len(),
        db = %args.db_url,
        "seeded demo course"
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
