//! The `simulado recompute` command.

use std::path::PathBuf;

use anyhow::Result;

pub async fn execute(user: String, config_path: Option<PathBuf>) -> Result<()> {
    let (_config, engine) = super::open_engine(config_path)?;
    let summary = engine.recompute_user(&user).await?;

    for s in &summary.refreshed {
        println!(
            "  {}: {}/{} correct ({:.2}%)",
            s.subject, s.correct_answers, s.total_questions, s.success_rate
        );
    }
    for (subject, e) in &summary.failed {
        eprintln!("  {subject}: FAILED: {e}");
    }
    for (question_id, e) in &summary.failed_questions {
        eprintln!("  question {question_id}: FAILED: {e}");
    }

    println!(
        "Recomputed {} subject(s) and {} question(s) for {user}.",
        summary.refreshed.len(),
        summary.questions_refreshed
    );

    if !summary.is_complete() {
        anyhow::bail!(
            "{} subject(s) and {} question(s) could not be recomputed",
            summary.failed.len(),
            summary.failed_questions.len()
        );
    }
    Ok(())
}
