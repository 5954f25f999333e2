//! Question selection for new practice exams.
//!
//! Resolves the subject list, decides a difficulty per subject (fixed, or
//! adaptive from the user's stored success rate), pulls a capped candidate
//! pool per subject and finally shuffles and truncates the combined pool.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimuladoError};
use crate::model::{Difficulty, DifficultyPolicy, Question, UserSubjectStats};
use crate::traits::Storage;

/// Product thresholds and defaults for exam generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Question count used when a request does not name one.
    pub default_total_questions: u32,
    /// Largest question count a single request may ask for. Unbounded when unset.
    pub max_total_questions: Option<u32>,
    /// Default time limit per question, in minutes.
    pub minutes_per_question: u32,
    /// Success rates strictly below this resolve to easy.
    pub easy_below: f64,
    /// Success rates strictly above this resolve to hard.
    pub hard_above: f64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            default_total_questions: 20,
            max_total_questions: None,
            minutes_per_question: 2,
            easy_below: 40.0,
            hard_above: 70.0,
        }
    }
}

impl SelectionPolicy {
    /// Adaptive difficulty for one subject.
    ///
    /// No stats row, or a row with nothing answered yet, resolves to medium.
    pub fn difficulty_for(&self, stats: Option<&UserSubjectStats>) -> Difficulty {
        match stats {
            Some(s) if s.total_questions > 0 => {
                if s.success_rate < self.easy_below {
                    Difficulty::Easy
                } else if s.success_rate > self.hard_above {
                    Difficulty::Hard
                } else {
                    Difficulty::Medium
                }
            }
            _ => Difficulty::Medium,
        }
    }

    /// Default exam time limit in minutes for `total` questions.
    pub fn time_limit_for(&self, total: u32) -> u32 {
        total.saturating_mul(self.minutes_per_question)
    }

    /// Check a requested question count, falling back to the default.
    pub fn resolve_total(&self, requested: Option<u32>) -> Result<u32> {
        let total = requested.unwrap_or(self.default_total_questions);
        if total == 0 {
            return Err(SimuladoError::Validation(
                "totalQuestions must be a positive integer".into(),
            ));
        }
        if let Some(max) = self.max_total_questions {
            if total > max {
                return Err(SimuladoError::Validation(format!(
                    "totalQuestions must be at most {max}"
                )));
            }
        }
        Ok(total)
    }
}

/// Per-subject cap on candidates: `ceil(total / subject_count)`.
pub fn per_subject_limit(total: u32, subject_count: usize) -> usize {
    if subject_count == 0 {
        return 0;
    }
    (total as usize).div_ceil(subject_count)
}

/// Trim names, drop blanks and repeats, keep first-seen order.
pub fn normalize_subjects(subjects: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(subjects.len());
    for subject in subjects {
        let trimmed = subject.trim();
        if !trimmed.is_empty() && !seen.iter().any(|s| s == trimmed) {
            seen.push(trimmed.to_string());
        }
    }
    seen
}

/// The difficulty and candidate cap decided for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPlan {
    pub subject: String,
    pub difficulty: Difficulty,
    pub limit: usize,
}

/// Decide the difficulty of each subject.
///
/// Adaptive policies look up the user's stats row per subject; fixed policies
/// apply the same difficulty everywhere without touching stats.
pub async fn plan_subjects(
    storage: &dyn Storage,
    user_id: &str,
    subjects: &[String],
    policy: DifficultyPolicy,
    total: u32,
    selection: &SelectionPolicy,
) -> Result<Vec<SubjectPlan>> {
    let limit = per_subject_limit(total, subjects.len());
    let mut plans = Vec::with_capacity(subjects.len());

    for subject in subjects {
        let difficulty = match policy.fixed() {
            Some(fixed) => fixed,
            None => {
                let stats = storage
                    .get_user_subject_stats(user_id, subject)
                    .await
                    .map_err(|e| {
                        tracing::error!(%user_id, %subject, "stats lookup failed: {e}");
                        e
                    })?;
                selection.difficulty_for(stats.as_ref())
            }
        };
        tracing::debug!(%subject, %difficulty, limit, "planned subject");
        plans.push(SubjectPlan {
            subject: subject.clone(),
            difficulty,
            limit,
        });
    }

    Ok(plans)
}

/// Fetch each subject's candidate pool and concatenate in plan order.
pub async fn gather_candidates(
    storage: &dyn Storage,
    plans: &[SubjectPlan],
) -> Result<Vec<Question>> {
    let mut pool = Vec::new();
    for plan in plans {
        let found = storage
            .active_questions(&plan.subject, plan.difficulty, plan.limit)
            .await
            .map_err(|e| {
                tracing::error!(subject = %plan.subject, "candidate query failed: {e}");
                e
            })?;
        pool.extend(found);
    }
    Ok(pool)
}

/// Uniformly permute `pool` and keep at most `total` questions.
pub fn shuffle_and_truncate<R: Rng + ?Sized>(
    mut pool: Vec<Question>,
    total: u32,
    rng: &mut R,
) -> Vec<Question> {
    pool.shuffle(rng);
    pool.truncate(total as usize);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::model::{Alternative, NewQuestion};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stats(rate: f64, total: u32) -> UserSubjectStats {
        UserSubjectStats {
            user_id: "u1".into(),
            subject: "Matemática".into(),
            total_questions: total,
            correct_answers: 0,
            average_time: 0.0,
            success_rate: rate,
            last_updated: Utc::now(),
        }
    }

    fn question(subject: &str, difficulty: Difficulty) -> NewQuestion {
        NewQuestion {
            title: "t".into(),
            statement: "s".into(),
            alternatives: vec![
                Alternative {
                    id: "a".into(),
                    text: "1".into(),
                },
                Alternative {
                    id: "b".into(),
                    text: "2".into(),
                },
            ],
            correct_alternative: "a".into(),
            explanation: None,
            subject: subject.into(),
            exam_board: None,
            exam_year: None,
            exam_type: None,
            difficulty,
            tags: vec![],
            is_active: true,
        }
    }

    #[test]
    fn adaptive_thresholds_are_exclusive() {
        let policy = SelectionPolicy::default();
        assert_eq!(policy.difficulty_for(Some(&stats(35.0, 10))), Difficulty::Easy);
        assert_eq!(policy.difficulty_for(Some(&stats(40.0, 10))), Difficulty::Medium);
        assert_eq!(policy.difficulty_for(Some(&stats(55.0, 10))), Difficulty::Medium);
        assert_eq!(policy.difficulty_for(Some(&stats(70.0, 10))), Difficulty::Medium);
        assert_eq!(policy.difficulty_for(Some(&stats(71.0, 10))), Difficulty::Hard);
        assert_eq!(policy.difficulty_for(Some(&stats(85.0, 10))), Difficulty::Hard);
        assert_eq!(policy.difficulty_for(None), Difficulty::Medium);
    }

    #[test]
    fn empty_stats_row_counts_as_absent() {
        let policy = SelectionPolicy::default();
        assert_eq!(policy.difficulty_for(Some(&stats(0.0, 0))), Difficulty::Medium);
        assert_eq!(policy.difficulty_for(Some(&stats(0.0, 3))), Difficulty::Easy);
    }

    #[test]
    fn per_subject_limit_rounds_up() {
        assert_eq!(per_subject_limit(20, 3), 7);
        assert_eq!(per_subject_limit(5, 1), 5);
        assert_eq!(per_subject_limit(1, 4), 1);
        assert_eq!(per_subject_limit(10, 0), 0);
    }

    #[test]
    fn resolve_total_validates() {
        let policy = SelectionPolicy::default();
        assert_eq!(policy.resolve_total(None).unwrap(), 20);
        assert_eq!(policy.resolve_total(Some(5)).unwrap(), 5);
        assert!(matches!(
            policy.resolve_total(Some(0)),
            Err(SimuladoError::Validation(_))
        ));
        assert_eq!(policy.resolve_total(Some(500)).unwrap(), 500);
        assert_eq!(policy.time_limit_for(20), 40);
    }

    #[test]
    fn configured_cap_bounds_requests() {
        let policy = SelectionPolicy {
            max_total_questions: Some(50),
            ..Default::default()
        };
        assert_eq!(policy.resolve_total(Some(50)).unwrap(), 50);
        assert!(matches!(
            policy.resolve_total(Some(51)),
            Err(SimuladoError::Validation(_))
        ));
    }

    #[test]
    fn normalize_drops_blanks_and_repeats() {
        let input = vec![
            " Português ".to_string(),
            "".to_string(),
            "Matemática".to_string(),
            "Português".to_string(),
        ];
        assert_eq!(normalize_subjects(&input), vec!["Português", "Matemática"]);
    }

    #[tokio::test]
    async fn fixed_policy_skips_stats_lookup() {
        let storage = MemoryStorage::new();
        storage
            .upsert_user_subject_stats(stats(10.0, 10))
            .await
            .unwrap();
        let plans = plan_subjects(
            &storage,
            "u1",
            &["Matemática".to_string()],
            DifficultyPolicy::Hard,
            5,
            &SelectionPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(plans[0].difficulty, Difficulty::Hard);
    }

    #[tokio::test]
    async fn adaptive_policy_is_per_subject() {
        let storage = MemoryStorage::new();
        storage
            .upsert_user_subject_stats(stats(20.0, 10))
            .await
            .unwrap();
        let mut strong = stats(90.0, 10);
        strong.subject = "Português".into();
        storage.upsert_user_subject_stats(strong).await.unwrap();

        let subjects = vec![
            "Matemática".to_string(),
            "Português".to_string(),
            "Informática".to_string(),
        ];
        let plans = plan_subjects(
            &storage,
            "u1",
            &subjects,
            DifficultyPolicy::Adaptive,
            10,
            &SelectionPolicy::default(),
        )
        .await
        .unwrap();
        let difficulties: Vec<Difficulty> = plans.iter().map(|p| p.difficulty).collect();
        assert_eq!(
            difficulties,
            vec![Difficulty::Easy, Difficulty::Hard, Difficulty::Medium]
        );
        assert!(plans.iter().all(|p| p.limit == 4));
    }

    #[tokio::test]
    async fn gather_caps_each_subject() {
        let storage = MemoryStorage::new();
        for _ in 0..6 {
            storage
                .create_question(question("Matemática", Difficulty::Medium))
                .await
                .unwrap();
            storage
                .create_question(question("Português", Difficulty::Medium))
                .await
                .unwrap();
        }
        let plans = vec![
            SubjectPlan {
                subject: "Matemática".into(),
                difficulty: Difficulty::Medium,
                limit: 2,
            },
            SubjectPlan {
                subject: "Português".into(),
                difficulty: Difficulty::Medium,
                limit: 3,
            },
        ];
        let pool = gather_candidates(&storage, &plans).await.unwrap();
        assert_eq!(pool.len(), 5);
        assert_eq!(pool[0].subject, "Matemática");
        assert_eq!(pool[4].subject, "Português");
    }

    #[tokio::test]
    async fn shuffle_truncates_and_keeps_members() {
        let storage = MemoryStorage::new();
        for _ in 0..10 {
            storage
                .create_question(question("Matemática", Difficulty::Easy))
                .await
                .unwrap();
        }
        let pool = storage
            .active_questions("Matemática", Difficulty::Easy, 10)
            .await
            .unwrap();
        let ids: Vec<String> = pool.iter().map(|q| q.id.clone()).collect();

        let mut rng = StdRng::seed_from_u64(7);
        let picked = shuffle_and_truncate(pool.clone(), 4, &mut rng);
        assert_eq!(picked.len(), 4);
        assert!(picked.iter().all(|q| ids.contains(&q.id)));

        let under = shuffle_and_truncate(pool, 50, &mut rng);
        assert_eq!(under.len(), 10);
    }

    #[test]
    fn shuffle_reaches_every_position() {
        // Each of three items should land first at least once over many draws.
        let now = Utc::now();
        let make = |id: &str| Question {
            id: id.into(),
            title: String::new(),
            statement: String::new(),
            alternatives: vec![],
            correct_alternative: String::new(),
            explanation: None,
            subject: "s".into(),
            exam_board: None,
            exam_year: None,
            exam_type: None,
            difficulty: Difficulty::Easy,
            tags: vec![],
            success_rate: 0.0,
            total_attempts: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let pool = vec![make("x"), make("y"), make("z")];
        let mut rng = StdRng::seed_from_u64(42);
        let mut firsts = std::collections::HashSet::new();
        for _ in 0..200 {
            let picked = shuffle_and_truncate(pool.clone(), 1, &mut rng);
            firsts.insert(picked[0].id.clone());
        }
        assert_eq!(firsts.len(), 3);
    }
}
