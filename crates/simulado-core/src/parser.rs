//! TOML question-bank parser.
//!
//! Loads question banks from TOML files and directories, and validates them
//! before they are seeded into storage.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Alternative, Difficulty, NewQuestion};

/// Intermediate TOML structure for question-bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    default_subject: Option<String>,
    #[serde(default)]
    default_exam_board: Option<String>,
    #[serde(default)]
    default_exam_year: Option<i32>,
    #[serde(default = "default_difficulty_str")]
    default_difficulty: String,
}

fn default_difficulty_str() -> String {
    "medium".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    title: String,
    statement: String,
    #[serde(default)]
    alternatives: Vec<TomlAlternative>,
    correct: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    exam_board: Option<String>,
    #[serde(default)]
    exam_year: Option<i32>,
    #[serde(default)]
    exam_type: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_true")]
    active: bool,
}

#[derive(Debug, Deserialize)]
struct TomlAlternative {
    id: String,
    text: String,
}

fn default_true() -> bool {
    true
}

/// A parsed question bank.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    pub description: String,
    pub questions: Vec<BankQuestion>,
}

/// One question of a bank, keyed by its id within the file.
///
/// The key only identifies the entry in warnings; storage assigns the
/// persisted id when the bank is seeded.
#[derive(Debug, Clone)]
pub struct BankQuestion {
    pub key: String,
    pub question: NewQuestion,
}

/// Parse a single TOML file into a `QuestionBank`.
pub fn parse_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank`.
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let header = parsed.bank;
    let default_difficulty: Difficulty = header
        .default_difficulty
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}", e))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let difficulty = q
                .difficulty
                .map(|d| {
                    d.parse()
                        .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))
                })
                .transpose()?
                .unwrap_or(default_difficulty);

            let subject = q
                .subject
                .or_else(|| header.default_subject.clone())
                .with_context(|| format!("question {} has no subject and the bank no default_subject", q.id))?;

            Ok(BankQuestion {
                key: q.id,
                question: NewQuestion {
                    title: q.title,
                    statement: q.statement,
                    alternatives: q
                        .alternatives
                        .into_iter()
                        .map(|a| Alternative {
                            id: a.id,
                            text: a.text,
                        })
                        .collect(),
                    correct_alternative: q.correct,
                    explanation: q.explanation,
                    subject,
                    exam_board: q.exam_board.or_else(|| header.default_exam_board.clone()),
                    exam_year: q.exam_year.or(header.default_exam_year),
                    exam_type: q.exam_type,
                    difficulty,
                    tags: q.tags,
                    is_active: q.active,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QuestionBank {
        id: header.id,
        name: header.name,
        description: header.description,
        questions,
    })
}

/// Recursively load all `.toml` question banks from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a single bank file, or every bank under a directory.
pub fn load_banks(path: &Path) -> Result<Vec<QuestionBank>> {
    if path.is_dir() {
        load_bank_directory(path)
    } else {
        Ok(vec![parse_bank(path)?])
    }
}

/// A warning from question-bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Key of the offending question, if the warning is about one.
    pub question: Option<String>,
    pub message: String,
}

/// Validate a bank. A question with any warning would be rejected on seeding.
pub fn validate_bank(bank: &QuestionBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bank.questions.is_empty() {
        warnings.push(ValidationWarning {
            question: None,
            message: format!("bank {} has no questions", bank.id),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for entry in &bank.questions {
        if !seen.insert(&entry.key) {
            warnings.push(ValidationWarning {
                question: Some(entry.key.clone()),
                message: format!("duplicate question id: {}", entry.key),
            });
        }
        for problem in entry.question.problems() {
            warnings.push(ValidationWarning {
                question: Some(entry.key.clone()),
                message: problem,
            });
        }
    }

    warnings
}
