use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use course_core::model::{EnrollmentId, LessonId, LessonKind};
use services::{Clock, CourseServices, LessonNavigator, NavigationError, ProgressError};
use tracing_subscriber::EnvFilter;

mod quiz_prompt;

/// Study a course from the terminal.
#[derive(Debug, Parser)]
#[command(name = "course", version, about)]
struct Args {
    /// SQLite URL or path
    #[arg(long = "db", env = "COURSE_DB_URL", default_value = "sqlite://dev.sqlite3")]
    db_url: String,

    /// Enrollment whose course is studied
    #[arg(short, long, env = "COURSE_ENROLLMENT_ID", default_value_t = 1)]
    enrollment: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List lessons with their completion state
    Lessons,
    /// Show the course completion percentage
    Progress,
    /// Recompute the stored course percentage from lesson records
    Refresh,
    /// Mark a text lesson complete, or a video as watched to the end
    Complete { lesson: u64 },
    /// Record how many seconds of a video lesson were watched
    Watch { lesson: u64, seconds: u32 },
    /// Take the quiz of a quiz lesson
    Quiz { lesson: u64 },
}

fn normalize_sqlite_url(raw: &str) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw.to_string();
    }

    let trimmed = raw.trim();
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .with_context(|| format!("invalid --db value: {db_url}"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open(nav: &mut LessonNavigator, lesson: u64) -> anyhow::Result<LessonKind> {
    let active = nav.open(LessonId::new(lesson)).await?;
    Ok(active.lesson().kind())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let db_url = normalize_sqlite_url(&args.db_url);
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&db_url)?;
    let services = CourseServices::new_sqlite(&db_url, Clock::system()).await?;
    let enrollment_id = EnrollmentId::new(args.enrollment);
    tracing::debug!(db = %db_url, enrollment_id = %enrollment_id, "course services ready");

    match args.command {
        Command::Lessons => {
            let progress = services.tracker().course_progress(enrollment_id).await?;
            for (i, status) in progress.lessons.iter().enumerate() {
                let lesson = &status.lesson;
                let duration = lesson
                    .duration_minutes()
                    .map(|m| format!(" ({m} min)"))
                    .unwrap_or_default();
                println!(
                    "[{}] {:>2}. #{} {} [{}]{}",
                    if status.is_completed() { "x" } else { " " },
                    i + 1,
                    lesson.id(),
                    lesson.title(),
                    lesson.kind(),
                    duration,
                );
            }
            println!(
                "{} of {} lessons complete ({}%)",
                progress.completed, progress.total, progress.percentage
            );
        }
        Command::Progress => {
            let aggregate = services.tracker().compute_aggregate(enrollment_id).await?;
            println!("{aggregate}%");
        }
        Command::Refresh => {
            let aggregate = services.tracker().refresh_aggregate(enrollment_id).await?;
            println!("Course progress: {aggregate}%");
        }
        Command::Complete { lesson } => {
            let mut nav = services.navigator(enrollment_id).await?;
            let signal = match open(&mut nav, lesson).await? {
                LessonKind::Text => nav.mark_complete().await,
                LessonKind::Video => nav.video_ended().await,
                LessonKind::Quiz => bail!("quiz lessons are completed by taking the quiz"),
            };
            let outcome = match signal {
                Ok(outcome) => outcome,
                Err(NavigationError::Progress(ProgressError::AggregateUpdate { source, .. })) => {
                    tracing::warn!(error = %source, "course progress not updated, retrying once");
                    nav.retry_completion()
                        .await?
                        .context("lesson completion was not pending")?
                }
                Err(err) => return Err(err.into()),
            };
            match outcome.aggregate {
                Some(aggregate) => println!("Lesson completed. Course progress: {aggregate}%"),
                None => {
                    // An earlier run may have saved the lesson but not the percentage.
                    let aggregate = services.tracker().refresh_aggregate(enrollment_id).await?;
                    println!("Lesson was already complete. Course progress: {aggregate}%");
                }
            }
        }
        Command::Watch { lesson, seconds } => {
            let mut nav = services.navigator(enrollment_id).await?;
            open(&mut nav, lesson).await?;
            nav.video_progress(seconds).await?;
        }
        Command::Quiz { lesson } => {
            let mut nav = services.navigator(enrollment_id).await?;
            open(&mut nav, lesson).await?;
            quiz_prompt::run(&mut nav).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}
