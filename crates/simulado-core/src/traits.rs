//! The persistence contract every backend implements.
//!
//! The engine, selector and aggregator only ever talk to `dyn Storage`; the
//! `simulado-storage` crate provides SQLite and Firestore implementations and
//! [`crate::memory::MemoryStorage`] serves as the in-process test double.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{
    AnswerRecord, Difficulty, NewAnswer, NewQuestion, NewSimulado, Question, QuestionFilter,
    Simulado, SimuladoUpdate, UserProfile, UserSubjectStats,
};

pub type StorageResult<T> = Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Async persistence operations for questions, exams, answers and rollups.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name (e.g. "sqlite").
    fn backend(&self) -> &str;

    // -- profiles ----------------------------------------------------------

    async fn get_user_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>>;

    /// Create or overwrite the single profile of `profile.user_id`.
    async fn save_user_profile(&self, profile: UserProfile) -> StorageResult<UserProfile>;

    // -- questions ---------------------------------------------------------

    /// Active questions passing `filter`, newest first, after offset/limit.
    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<Question>>;

    async fn get_question(&self, id: &str) -> StorageResult<Option<Question>>;

    async fn create_question(&self, question: NewQuestion) -> StorageResult<Question>;

    /// Overwrite a question's attempt count and success rate.
    async fn update_question_rollup(
        &self,
        question_id: &str,
        total_attempts: u32,
        success_rate: f64,
    ) -> StorageResult<()>;

    /// Candidate pool for exam generation: active questions of one subject at
    /// one difficulty, at most `limit` of them.
    async fn active_questions(
        &self,
        subject: &str,
        difficulty: Difficulty,
        limit: usize,
    ) -> StorageResult<Vec<Question>> {
        self.list_questions(&QuestionFilter::candidates(subject, difficulty, limit))
            .await
    }

    // -- simulados ---------------------------------------------------------

    async fn create_simulado(&self, simulado: NewSimulado) -> StorageResult<Simulado>;

    async fn get_simulado(&self, id: &str) -> StorageResult<Option<Simulado>>;

    /// Exams of one user, newest first.
    async fn list_simulados(&self, user_id: &str) -> StorageResult<Vec<Simulado>>;

    async fn update_simulado(&self, id: &str, update: &SimuladoUpdate)
        -> StorageResult<Simulado>;

    // -- answers -----------------------------------------------------------

    async fn create_answer(&self, answer: NewAnswer) -> StorageResult<AnswerRecord>;

    async fn list_answers_for_question(&self, question_id: &str)
        -> StorageResult<Vec<AnswerRecord>>;

    /// Every answer of `user_id` to a question of `subject`.
    async fn list_answers_for_user_subject(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Vec<AnswerRecord>>;

    /// Answers of one user, optionally narrowed to a question and/or exam,
    /// newest first.
    async fn list_user_answers(
        &self,
        user_id: &str,
        question_id: Option<&str>,
        simulado_id: Option<&str>,
    ) -> StorageResult<Vec<AnswerRecord>>;

    // -- statistics --------------------------------------------------------

    async fn get_user_subject_stats(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Option<UserSubjectStats>>;

    /// Stats rows of one user, optionally one subject, most recent first.
    async fn list_user_subject_stats(
        &self,
        user_id: &str,
        subject: Option<&str>,
    ) -> StorageResult<Vec<UserSubjectStats>>;

    /// Insert or overwrite the unique row for `(stats.user_id, stats.subject)`.
    async fn upsert_user_subject_stats(
        &self,
        stats: UserSubjectStats,
    ) -> StorageResult<UserSubjectStats>;
}
