//! The `simulado validate` command.

use std::path::PathBuf;

use anyhow::Result;

use simulado_core::parser;

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = parser::load_banks(&bank_path)?;

    let mut total_warnings = 0;

    for bank in &banks {
        println!("Question bank: {} ({} questions)", bank.name, bank.questions.len());

        let warnings = parser::validate_bank(bank);
        for w in &warnings {
            let prefix = w
                .question
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All question banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
