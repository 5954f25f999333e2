//! In-memory storage backend.
//!
//! Used as the zero-configuration development backend and as the test double
//! for the engine. Failure switches let tests exercise the aggregator's
//! partial-failure path without a real database.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{
    AnswerRecord, ExamStatus, NewAnswer, NewQuestion, NewSimulado, Question, QuestionFilter,
    Simulado, SimuladoUpdate, UserProfile, UserSubjectStats,
};
use crate::traits::{Storage, StorageResult};

#[derive(Default)]
struct State {
    profiles: Vec<UserProfile>,
    questions: Vec<Question>,
    simulados: Vec<Simulado>,
    answers: Vec<AnswerRecord>,
    stats: Vec<UserSubjectStats>,
}

/// A `Storage` that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    fail_question_rollups: AtomicBool,
    fail_stats_upserts: AtomicBool,
    candidate_queries: AtomicU32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `update_question_rollup` call fail.
    pub fn fail_question_rollups(&self, fail: bool) {
        self.fail_question_rollups.store(fail, Ordering::Relaxed);
    }

    /// Make every `upsert_user_subject_stats` call fail.
    pub fn fail_stats_upserts(&self, fail: bool) {
        self.fail_stats_upserts.store(fail, Ordering::Relaxed);
    }

    /// Number of `list_questions` calls made so far.
    pub fn candidate_queries(&self) -> u32 {
        self.candidate_queries.load(Ordering::Relaxed)
    }

    /// Insert a fully formed question, keeping its id and rollups.
    pub fn insert_question(&self, question: Question) {
        self.lock().questions.push(question);
    }

    /// Number of recorded answers.
    pub fn answer_count(&self) -> usize {
        self.lock().answers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get_user_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>> {
        Ok(self
            .lock()
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn save_user_profile(&self, profile: UserProfile) -> StorageResult<UserProfile> {
        let mut state = self.lock();
        match state
            .profiles
            .iter_mut()
            .find(|p| p.user_id == profile.user_id)
        {
            Some(existing) => *existing = profile.clone(),
            None => state.profiles.push(profile.clone()),
        }
        Ok(profile)
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<Question>> {
        self.candidate_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.lock();
        let mut matching: Vec<Question> = state
            .questions
            .iter()
            .rev()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        // Stable: ties keep newest-inserted first.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_question(&self, id: &str) -> StorageResult<Option<Question>> {
        Ok(self.lock().questions.iter().find(|q| q.id == id).cloned())
    }

    async fn create_question(&self, question: NewQuestion) -> StorageResult<Question> {
        let now = Utc::now();
        let created = Question {
            id: Uuid::new_v4().to_string(),
            title: question.title,
            statement: question.statement,
            alternatives: question.alternatives,
            correct_alternative: question.correct_alternative,
            explanation: question.explanation,
            subject: question.subject,
            exam_board: question.exam_board,
            exam_year: question.exam_year,
            exam_type: question.exam_type,
            difficulty: question.difficulty,
            tags: question.tags,
            success_rate: 0.0,
            total_attempts: 0,
            is_active: question.is_active,
            created_at: now,
            updated_at: now,
        };
        self.lock().questions.push(created.clone());
        Ok(created)
    }

    async fn update_question_rollup(
        &self,
        question_id: &str,
        total_attempts: u32,
        success_rate: f64,
    ) -> StorageResult<()> {
        if self.fail_question_rollups.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable(
                "question rollup writes disabled".into(),
            ));
        }
        let mut state = self.lock();
        let question = state
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| StorageError::Missing {
                collection: "questions",
                id: question_id.to_string(),
            })?;
        question.total_attempts = total_attempts;
        question.success_rate = success_rate;
        question.updated_at = Utc::now();
        Ok(())
    }

    async fn create_simulado(&self, simulado: NewSimulado) -> StorageResult<Simulado> {
        let created = Simulado {
            id: Uuid::new_v4().to_string(),
            user_id: simulado.user_id,
            title: simulado.title,
            exam_type: simulado.exam_type,
            subjects: simulado.subjects,
            total_questions: simulado.total_questions,
            time_limit: simulado.time_limit,
            difficulty: simulado.difficulty,
            status: ExamStatus::NotStarted,
            question_ids: simulado.question_ids,
            correct_answers: 0,
            score: None,
            time_spent: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.lock().simulados.push(created.clone());
        Ok(created)
    }

    async fn get_simulado(&self, id: &str) -> StorageResult<Option<Simulado>> {
        Ok(self.lock().simulados.iter().find(|s| s.id == id).cloned())
    }

    async fn list_simulados(&self, user_id: &str) -> StorageResult<Vec<Simulado>> {
        Ok(self
            .lock()
            .simulados
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_simulado(
        &self,
        id: &str,
        update: &SimuladoUpdate,
    ) -> StorageResult<Simulado> {
        let mut state = self.lock();
        let simulado = state
            .simulados
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StorageError::Missing {
                collection: "simulados",
                id: id.to_string(),
            })?;
        update.apply(simulado);
        Ok(simulado.clone())
    }

    async fn create_answer(&self, answer: NewAnswer) -> StorageResult<AnswerRecord> {
        let created = AnswerRecord {
            id: Uuid::new_v4().to_string(),
            user_id: answer.user_id,
            question_id: answer.question_id,
            subject: answer.subject,
            simulado_id: answer.simulado_id,
            selected_alternative: answer.selected_alternative,
            is_correct: answer.is_correct,
            time_spent: answer.time_spent,
            created_at: Utc::now(),
        };
        self.lock().answers.push(created.clone());
        Ok(created)
    }

    async fn list_answers_for_question(
        &self,
        question_id: &str,
    ) -> StorageResult<Vec<AnswerRecord>> {
        Ok(self
            .lock()
            .answers
            .iter()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn list_answers_for_user_subject(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let state = self.lock();
        // Join against the question table, like the relational backend.
        Ok(state
            .answers
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| {
                state
                    .questions
                    .iter()
                    .any(|q| q.id == a.question_id && q.subject == subject)
            })
            .cloned()
            .collect())
    }

    async fn list_user_answers(
        &self,
        user_id: &str,
        question_id: Option<&str>,
        simulado_id: Option<&str>,
    ) -> StorageResult<Vec<AnswerRecord>> {
        Ok(self
            .lock()
            .answers
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .filter(|a| question_id.map_or(true, |q| a.question_id == q))
            .filter(|a| simulado_id.map_or(true, |s| a.simulado_id.as_deref() == Some(s)))
            .cloned()
            .collect())
    }

    async fn get_user_subject_stats(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Option<UserSubjectStats>> {
        Ok(self
            .lock()
            .stats
            .iter()
            .find(|s| s.user_id == user_id && s.subject == subject)
            .cloned())
    }

    async fn list_user_subject_stats(
        &self,
        user_id: &str,
        subject: Option<&str>,
    ) -> StorageResult<Vec<UserSubjectStats>> {
        let mut rows: Vec<UserSubjectStats> = self
            .lock()
            .stats
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter(|s| subject.map_or(true, |subj| s.subject == subj))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(rows)
    }

    async fn upsert_user_subject_stats(
        &self,
        stats: UserSubjectStats,
    ) -> StorageResult<UserSubjectStats> {
        if self.fail_stats_upserts.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("stats writes disabled".into()));
        }
        let mut state = self.lock();
        match state
            .stats
            .iter_mut()
            .find(|s| s.user_id == stats.user_id && s.subject == stats.subject)
        {
            Some(existing) => *existing = stats.clone(),
            None => state.stats.push(stats.clone()),
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alternative, Difficulty};

    fn new_question(subject: &str, difficulty: Difficulty) -> NewQuestion {
        NewQuestion {
            title: format!("{subject} {difficulty}"),
            statement: "Enunciado".into(),
            alternatives: vec![
                Alternative {
                    id: "a".into(),
                    text: "Certo".into(),
                },
                Alternative {
                    id: "b".into(),
                    text: "Errado".into(),
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

    #[tokio::test]
    async fn stats_upsert_keeps_one_row_per_pair() {
        let storage = MemoryStorage::new();
        let row = |total| UserSubjectStats {
            user_id: "u1".into(),
            subject: "Português".into(),
            total_questions: total,
            correct_answers: 0,
            average_time: 0.0,
            success_rate: 0.0,
            last_updated: Utc::now(),
        };
        storage.upsert_user_subject_stats(row(1)).await.unwrap();
        storage.upsert_user_subject_stats(row(2)).await.unwrap();

        let rows = storage.list_user_subject_stats("u1", None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_questions, 2);
    }

    #[tokio::test]
    async fn candidate_listing_respects_limit_and_activity() {
        let storage = MemoryStorage::new();
        for _ in 0..4 {
            storage
                .create_question(new_question("Matemática", Difficulty::Easy))
                .await
                .unwrap();
        }
        let mut inactive = new_question("Matemática", Difficulty::Easy);
        inactive.is_active = false;
        storage.create_question(inactive).await.unwrap();

        let found = storage
            .active_questions("Matemática", Difficulty::Easy, 3)
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|q| q.is_active));
        assert_eq!(storage.candidate_queries(), 1);
    }

    #[tokio::test]
    async fn failure_switches_reject_writes() {
        let storage = MemoryStorage::new();
        let q = storage
            .create_question(new_question("Informática", Difficulty::Hard))
            .await
            .unwrap();
        storage.fail_question_rollups(true);
        assert!(storage.update_question_rollup(&q.id, 1, 100.0).await.is_err());
        storage.fail_question_rollups(false);
        storage.update_question_rollup(&q.id, 1, 100.0).await.unwrap();
        let q = storage.get_question(&q.id).await.unwrap().unwrap();
        assert_eq!(q.total_attempts, 1);
    }
}
