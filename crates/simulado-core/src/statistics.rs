//! Answer rollups: per-question and per-(user, subject) statistics.
//!
//! Every rollup is recomputed from the full answer log rather than bumped
//! incrementally, so re-running it is idempotent and repairs any earlier
//! drift or lost update. The cost is a scan of the relevant answers per call.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::{round2, AnswerRecord, UserSubjectStats};
use crate::traits::{Storage, StorageResult};

/// `correct / total * 100` at two decimals; 0 when `total` is 0.
pub fn success_rate(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(correct as f64 / total as f64 * 100.0)
}

/// Derived attempt counters of one question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRollup {
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub success_rate: f64,
}

/// Compute a question rollup from all of its answers.
pub fn question_rollup(answers: &[AnswerRecord]) -> QuestionRollup {
    let total = answers.len() as u32;
    let correct = answers.iter().filter(|a| a.is_correct).count() as u32;
    QuestionRollup {
        total_attempts: total,
        correct_attempts: correct,
        success_rate: success_rate(correct, total),
    }
}

/// Derived counters of one user in one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRollup {
    pub total_questions: u32,
    pub correct_answers: u32,
    pub average_time: f64,
    pub success_rate: f64,
}

/// Compute a subject rollup from a user's answers in that subject.
///
/// Answers without a recorded time are left out of the average instead of
/// counting as zero seconds.
pub fn subject_rollup(answers: &[AnswerRecord]) -> SubjectRollup {
    let total = answers.len() as u32;
    let correct = answers.iter().filter(|a| a.is_correct).count() as u32;

    let timed: Vec<u32> = answers.iter().filter_map(|a| a.time_spent).collect();
    let average_time = if timed.is_empty() {
        0.0
    } else {
        round2(timed.iter().map(|&t| t as f64).sum::<f64>() / timed.len() as f64)
    };

    SubjectRollup {
        total_questions: total,
        correct_answers: correct,
        average_time,
        success_rate: success_rate(correct, total),
    }
}

/// Recompute and store the rollup of one question.
pub async fn refresh_question(
    storage: &dyn Storage,
    question_id: &str,
) -> StorageResult<QuestionRollup> {
    let answers = storage.list_answers_for_question(question_id).await?;
    let rollup = question_rollup(&answers);
    storage
        .update_question_rollup(question_id, rollup.total_attempts, rollup.success_rate)
        .await?;
    Ok(rollup)
}

/// Recompute and upsert the stats row of one (user, subject) pair.
pub async fn refresh_user_subject(
    storage: &dyn Storage,
    user_id: &str,
    subject: &str,
) -> StorageResult<UserSubjectStats> {
    let answers = storage
        .list_answers_for_user_subject(user_id, subject)
        .await?;
    let rollup = subject_rollup(&answers);
    storage
        .upsert_user_subject_stats(UserSubjectStats {
            user_id: user_id.to_string(),
            subject: subject.to_string(),
            total_questions: rollup.total_questions,
            correct_answers: rollup.correct_answers,
            average_time: rollup.average_time,
            success_rate: rollup.success_rate,
            last_updated: Utc::now(),
        })
        .await
}

/// Result of refreshing both rollups after one answer.
///
/// The two halves are independent views over the same answer log; one
/// failing never prevents the other from being attempted.
#[derive(Debug)]
pub struct RollupOutcome {
    pub question: StorageResult<QuestionRollup>,
    pub subject: StorageResult<UserSubjectStats>,
}

impl RollupOutcome {
    /// Whether both rollups were stored.
    pub fn is_complete(&self) -> bool {
        self.question.is_ok() && self.subject.is_ok()
    }

    /// Human-readable description of each failed half.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = &self.question {
            warnings.push(format!("question rollup failed: {e}"));
        }
        if let Err(e) = &self.subject {
            warnings.push(format!("subject rollup failed: {e}"));
        }
        warnings
    }
}

/// Refresh the question rollup and the user-subject rollup for `answer`.
pub async fn aggregate(storage: &dyn Storage, answer: &AnswerRecord) -> RollupOutcome {
    let (question, subject) = futures::join!(
        refresh_question(storage, &answer.question_id),
        refresh_user_subject(storage, &answer.user_id, &answer.subject),
    );

    if let Err(e) = &question {
        tracing::error!(question_id = %answer.question_id, "question rollup failed: {e}");
    }
    if let Err(e) = &subject {
        tracing::error!(
            user_id = %answer.user_id,
            subject = %answer.subject,
            "subject rollup failed: {e}"
        );
    }

    RollupOutcome { question, subject }
}

/// Outcome of re-running every rollup one user's answers feed.
#[derive(Debug, Default)]
pub struct RecomputeSummary {
    pub refreshed: Vec<UserSubjectStats>,
    /// Subjects whose stats row could not be rewritten.
    pub failed: Vec<(String, StorageError)>,
    /// Number of question rollups rewritten.
    pub questions_refreshed: usize,
    /// Question ids whose rollup could not be rewritten.
    pub failed_questions: Vec<(String, StorageError)>,
}

impl RecomputeSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.failed_questions.is_empty()
    }
}

/// Re-run the subject rollup for every subject `user_id` has answered, and
/// the question rollup for every question they answered.
pub async fn recompute_user(
    storage: &dyn Storage,
    user_id: &str,
) -> StorageResult<RecomputeSummary> {
    let answers = storage.list_user_answers(user_id, None, None).await?;

    let mut subjects: Vec<&str> = answers.iter().map(|a| a.subject.as_str()).collect();
    subjects.sort_unstable();
    subjects.dedup();

    let mut question_ids: Vec<&str> = answers.iter().map(|a| a.question_id.as_str()).collect();
    question_ids.sort_unstable();
    question_ids.dedup();

    let mut summary = RecomputeSummary::default();
    for subject in subjects {
        match refresh_user_subject(storage, user_id, subject).await {
            Ok(stats) => summary.refreshed.push(stats),
            Err(e) => {
                tracing::error!(%user_id, %subject, "subject rollup failed: {e}");
                summary.failed.push((subject.to_string(), e));
            }
        }
    }
    for question_id in question_ids {
        match refresh_question(storage, question_id).await {
            Ok(_) => summary.questions_refreshed += 1,
            Err(e) => {
                tracing::error!(%question_id, "question rollup failed: {e}");
                summary.failed_questions.push((question_id.to_string(), e));
            }
        }
    }
    Ok(summary)
}
