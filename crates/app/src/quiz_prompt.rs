use anyhow::bail;
use chrono::{DateTime, Utc};
use course_core::{QuizResult, QuizSession, ScoreBand, SessionState};
use services::{LessonContent, LessonNavigator, NavigationError, QuizCompletion, QuizStep, review_items};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "number = select option, enter = next, b = back, r = retake, s = retry save, q = quit";

/// Run the open quiz lesson against stdin until the learner quits.
pub async fn run(nav: &mut LessonNavigator) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        let Some(active) = nav.active() else {
            bail!("no lesson is open");
        };
        match active.content() {
            LessonContent::Quiz(session) => render(session, nav.clock().now()),
            LessonContent::QuizEmpty => {
                println!("This quiz has no questions yet.");
                return Ok(());
            }
            LessonContent::QuizMissing => {
                println!("No quiz is available for this lesson.");
                return Ok(());
            }
            LessonContent::Video | LessonContent::Text => {
                bail!("lesson {} is not a quiz", active.lesson().id());
            }
        }

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let input = line.trim();

        let step = match input {
            "q" => return Ok(()),
            "?" | "h" => {
                println!("{HELP}");
                continue;
            }
            "b" => nav.retreat_quiz().await,
            "r" => nav.retake_quiz(),
            "s" => {
                match nav.retry_completion().await {
                    Ok(Some(outcome)) => println!(
                        "Saved. Course progress: {}%",
                        outcome.aggregate.unwrap_or_default()
                    ),
                    Ok(None) => println!("Nothing to save."),
                    Err(err) => println!("Still not saved: {err}"),
                }
                continue;
            }
            "" | "n" => nav.advance_quiz().await,
            other => match other.parse::<usize>() {
                Ok(choice) if choice > 0 => nav.select_answer(choice - 1).await,
                _ => {
                    println!("Unrecognised input. {HELP}");
                    continue;
                }
            },
        };

        match step {
            Ok(QuizStep::Completed(completion)) => report(&completion),
            Ok(_) => {}
            Err(NavigationError::Command(err)) => println!("{err}"),
            Err(err) => return Err(err.into()),
        }
    }
}

fn render(session: &QuizSession, now: DateTime<Utc>) {
    match session.state() {
        SessionState::Presenting { .. } => {
            let (Some(question), Some(progress)) = (session.current_question(), session.progress())
            else {
                return;
            };
            println!();
            println!(
                "Question {} of {} ({}%, {} answered)",
                progress.position, progress.total, progress.percent, progress.answered
            );
            if let Some(left) = session.time_left(now) {
                println!("Time left: {} min", left.num_minutes());
            }
            println!("{}", question.prompt());
            let selected = session.current_selection();
            for (i, option) in question.options().iter().enumerate() {
                let marker = if selected == Some(i) { '*' } else { ' ' };
                println!(" {marker} {}. {option}", i + 1);
            }
            if progress.is_last && progress.can_advance {
                println!("(enter submits the quiz)");
            }
        }
        SessionState::Completed(result) => summary(session, result),
    }
}

fn summary(session: &QuizSession, result: &QuizResult) {
    println!();
    println!(
        "Score: {}% ({} of {} correct) {}",
        result.score,
        result.correct_count,
        result.total,
        if result.passed { "PASSED" } else { "NOT PASSED" }
    );
    if result.timed_out {
        println!("Time ran out; unanswered questions count as incorrect.");
    }
    println!(
        "{}",
        match result.band() {
            ScoreBand::Excellent => "Excellent work!",
            ScoreBand::Good => "Good job.",
            ScoreBand::KeepStudying => "Keep studying and try again.",
        }
    );
    for item in review_items(session.quiz(), result) {
        let mark = if item.is_correct { "ok" } else { "x " };
        println!("[{mark}] {}. {}", item.position, item.prompt);
        println!("      your answer: {}", item.selected.unwrap_or("(none)"));
        if !item.is_correct {
            println!("      correct:     {}", item.correct);
        }
        if let Some(explanation) = item.explanation {
            println!("      {explanation}");
        }
    }
    println!("r = retake, q = quit");
}

fn report(completion: &QuizCompletion) {
    match &completion.saved {
        Ok(outcome) if outcome.newly_completed => println!(
            "Lesson completed. Course progress: {}%",
            outcome.aggregate.unwrap_or_default()
        ),
        Ok(_) => {}
        Err(err) => println!("Your score was not saved: {err}. Press s to retry."),
    }
}
