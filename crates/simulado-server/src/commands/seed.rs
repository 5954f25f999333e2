//! The `simulado seed` command.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;

use simulado_core::parser;

pub async fn execute(bank_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let banks = parser::load_banks(&bank_path)?;
    let (_config, engine) = super::open_engine(config_path)?;

    let mut created = 0usize;
    let mut skipped = 0usize;

    for bank in banks {
        let warnings = parser::validate_bank(&bank);
        let rejected: HashSet<&str> = warnings
            .iter()
            .filter_map(|w| w.question.as_deref())
            .collect();

        for w in &warnings {
            if let Some(key) = &w.question {
                eprintln!("  [{}/{key}] skipped: {}", bank.id, w.message);
            }
        }

        let mut bank_created = 0usize;
        for entry in &bank.questions {
            if rejected.contains(entry.key.as_str()) {
                skipped += 1;
                continue;
            }
            let question = engine.create_question(entry.question.clone()).await?;
            tracing::debug!(bank = %bank.id, key = %entry.key, id = %question.id, "seeded");
            bank_created += 1;
        }

        println!("Question bank: {} ({bank_created} seeded)", bank.name);
        created += bank_created;
    }

    println!(
        "\nSeeded {created} question(s) into {} storage, skipped {skipped}.",
        engine.storage().backend()
    );
    Ok(())
}
