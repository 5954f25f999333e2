//! The `simulado stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

pub async fn execute(
    user: String,
    subject: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (_config, engine) = super::open_engine(config_path)?;
    let stats = engine.list_stats(&user, subject.as_deref()).await?;

    if stats.is_empty() {
        println!("No statistics for {user}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Subject",
        "Answered",
        "Correct",
        "Success %",
        "Avg time (s)",
        "Updated",
    ]);
    for s in &stats {
        table.add_row(vec![
            Cell::new(&s.subject),
            Cell::new(s.total_questions),
            Cell::new(s.correct_answers),
            Cell::new(format!("{:.2}", s.success_rate)),
            Cell::new(format!("{:.1}", s.average_time)),
            Cell::new(s.last_updated.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{table}");

    Ok(())
}
