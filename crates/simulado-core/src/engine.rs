//! Request-level orchestration.
//!
//! `SimuladoEngine` is what the HTTP layer and the CLI call. It validates
//! input, checks ownership, runs the selector and the aggregator and maps
//! storage failures into [`SimuladoError`]. It keeps no business data between
//! calls; every operation rebuilds its view from storage.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimuladoError};
use crate::model::{
    AnswerRecord, DifficultyPolicy, ExamStatus, ExamType, NewAnswer, NewQuestion, NewSimulado,
    ProfileInput, Question, QuestionFilter, Simulado, SimuladoUpdate, UserProfile,
    UserSubjectStats,
};
use crate::selector::{self, SelectionPolicy, SubjectPlan};
use crate::statistics::{self, RecomputeSummary};
use crate::traits::Storage;

/// Page size when a question listing does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Request to generate a practice exam.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequest {
    /// Subjects to draw from; empty or missing falls back to the profile.
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    #[serde(default)]
    pub total_questions: Option<u32>,
    #[serde(default)]
    pub difficulty: DifficultyPolicy,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub exam_type: Option<ExamType>,
    /// Minutes; defaults to the policy's minutes per question.
    #[serde(default)]
    pub time_limit: Option<u32>,
}

/// A freshly generated exam and its questions in presentation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedExam {
    pub exam: Simulado,
    pub questions: Vec<Question>,
    /// Difficulty decided for each subject.
    pub plan: Vec<SubjectPlan>,
}

/// An answer as submitted by a user. Correctness is derived, never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: String,
    pub selected_alternative: String,
    #[serde(default)]
    pub simulado_id: Option<String>,
    #[serde(default)]
    pub time_spent: Option<u32>,
}

/// A recorded answer plus any rollup that could not be refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    #[serde(flatten)]
    pub answer: AnswerRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollup_warnings: Vec<String>,
}

/// The central engine.
pub struct SimuladoEngine {
    storage: Arc<dyn Storage>,
    selection: SelectionPolicy,
    rng: Mutex<StdRng>,
}

impl SimuladoEngine {
    pub fn new(storage: Arc<dyn Storage>, selection: SelectionPolicy) -> Self {
        Self {
            storage,
            selection,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a fixed shuffle seed, for reproducible tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn selection(&self) -> &SelectionPolicy {
        &self.selection
    }

    // -- profiles ----------------------------------------------------------

    /// Create or overwrite the caller's onboarding profile.
    pub async fn save_profile(&self, user_id: &str, input: ProfileInput) -> Result<UserProfile> {
        let now = Utc::now();
        let created_at = self
            .storage
            .get_user_profile(user_id)
            .await?
            .map(|p| p.created_at)
            .unwrap_or(now);

        let profile = UserProfile {
            user_id: user_id.to_string(),
            user_type: input.user_type,
            goals: input.goals,
            weekly_hours: input.weekly_hours,
            study_times: input.study_times,
            subjects: selector::normalize_subjects(&input.subjects),
            onboarding_completed: input.onboarding_completed,
            created_at,
            updated_at: now,
        };
        Ok(self.storage.save_user_profile(profile).await?)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.storage
            .get_user_profile(user_id)
            .await?
            .ok_or_else(|| SimuladoError::not_found("profile", user_id))
    }

    pub async fn complete_onboarding(&self, user_id: &str) -> Result<UserProfile> {
        let mut profile = self.get_profile(user_id).await?;
        profile.onboarding_completed = true;
        profile.updated_at = Utc::now();
        Ok(self.storage.save_user_profile(profile).await?)
    }

    // -- questions ---------------------------------------------------------

    pub async fn list_questions(&self, mut filter: QuestionFilter) -> Result<Vec<Question>> {
        if filter.limit.is_none() {
            filter.limit = Some(DEFAULT_PAGE_SIZE);
        }
        Ok(self.storage.list_questions(&filter).await?)
    }

    pub async fn get_question(&self, id: &str) -> Result<Question> {
        self.storage
            .get_question(id)
            .await?
            .ok_or_else(|| SimuladoError::not_found("question", id))
    }

    pub async fn create_question(&self, input: NewQuestion) -> Result<Question> {
        let problems = input.problems();
        if !problems.is_empty() {
            return Err(SimuladoError::Validation(problems.join("; ")));
        }
        Ok(self.storage.create_question(input).await?)
    }

    // -- exams -------------------------------------------------------------

    /// Select questions and persist a new exam for `user_id`.
    pub async fn generate_exam(&self, user_id: &str, request: ExamRequest) -> Result<GeneratedExam> {
        let total = self.selection.resolve_total(request.total_questions)?;
        let subjects = self
            .resolve_subjects(user_id, request.subjects.as_deref())
            .await?;

        let plan = selector::plan_subjects(
            self.storage.as_ref(),
            user_id,
            &subjects,
            request.difficulty,
            total,
            &self.selection,
        )
        .await?;
        let pool = selector::gather_candidates(self.storage.as_ref(), &plan).await?;
        let pool_size = pool.len();

        let questions = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            selector::shuffle_and_truncate(pool, total, &mut *rng)
        };

        let title = request
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Simulado Inteligente - {}", Utc::now().format("%d/%m/%Y")));

        let exam = self
            .storage
            .create_simulado(NewSimulado {
                user_id: user_id.to_string(),
                title,
                exam_type: request.exam_type.unwrap_or_default(),
                subjects,
                total_questions: total,
                time_limit: Some(
                    request
                        .time_limit
                        .unwrap_or_else(|| self.selection.time_limit_for(total)),
                ),
                difficulty: request.difficulty,
                question_ids: questions.iter().map(|q| q.id.clone()).collect(),
            })
            .await?;

        tracing::info!(
            %user_id,
            exam_id = %exam.id,
            requested = total,
            selected = questions.len(),
            pool = pool_size,
            "generated simulado"
        );

        Ok(GeneratedExam {
            exam,
            questions,
            plan,
        })
    }

    /// Requested subjects if any survive normalisation, else the profile's.
    async fn resolve_subjects(
        &self,
        user_id: &str,
        requested: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let requested = requested.map(selector::normalize_subjects).unwrap_or_default();
        if !requested.is_empty() {
            return Ok(requested);
        }

        let profile = self.get_profile(user_id).await?;
        let subjects = selector::normalize_subjects(&profile.subjects);
        if subjects.is_empty() {
            return Err(SimuladoError::Validation("no subjects specified".into()));
        }
        Ok(subjects)
    }

    pub async fn list_exams(&self, user_id: &str) -> Result<Vec<Simulado>> {
        Ok(self.storage.list_simulados(user_id).await?)
    }

    /// Fetch an exam owned by `user_id`.
    pub async fn get_exam(&self, user_id: &str, id: &str) -> Result<Simulado> {
        let exam = self
            .storage
            .get_simulado(id)
            .await?
            .ok_or_else(|| SimuladoError::not_found("simulado", id))?;
        if exam.user_id != user_id {
            return Err(SimuladoError::Conflict(format!(
                "simulado {id} belongs to another user"
            )));
        }
        Ok(exam)
    }

    /// Patch the progress of an exam owned by `user_id`.
    ///
    /// Entering `in_progress` or `completed` stamps the matching timestamp
    /// unless the patch carries one.
    pub async fn update_exam(
        &self,
        user_id: &str,
        id: &str,
        mut patch: SimuladoUpdate,
    ) -> Result<Simulado> {
        let exam = self.get_exam(user_id, id).await?;

        if let Some(score) = patch.score {
            if !(0.0..=100.0).contains(&score) {
                return Err(SimuladoError::Validation(
                    "score must be between 0 and 100".into(),
                ));
            }
        }
        if let Some(correct) = patch.correct_answers {
            if correct as usize > exam.question_ids.len() {
                return Err(SimuladoError::Validation(format!(
                    "correctAnswers {correct} exceeds the {} questions of this simulado",
                    exam.question_ids.len()
                )));
            }
        }
        if patch.title.as_ref().is_some_and(|t| t.trim().is_empty()) {
            return Err(SimuladoError::Validation("title is empty".into()));
        }

        let now = Utc::now();
        match patch.status {
            Some(ExamStatus::InProgress)
                if patch.started_at.is_none() && exam.started_at.is_none() =>
            {
                patch.started_at = Some(now);
            }
            Some(ExamStatus::Completed)
                if patch.completed_at.is_none() && exam.completed_at.is_none() =>
            {
                patch.completed_at = Some(now);
            }
            _ => {}
        }

        Ok(self.storage.update_simulado(id, &patch).await?)
    }

    // -- answers -----------------------------------------------------------

    /// Record an answer and refresh the rollups it affects.
    ///
    /// The answer is the source of truth: once stored it is returned even if
    /// a rollup fails, with the failure listed in `rollup_warnings`.
    pub async fn submit_answer(
        &self,
        user_id: &str,
        submission: AnswerSubmission,
    ) -> Result<SubmittedAnswer> {
        let question = self.get_question(&submission.question_id).await?;

        if !question
            .alternatives
            .iter()
            .any(|a| a.id == submission.selected_alternative)
        {
            return Err(SimuladoError::Validation(format!(
                "'{}' is not an alternative of question {}",
                submission.selected_alternative, question.id
            )));
        }

        if let Some(simulado_id) = &submission.simulado_id {
            let exam = self.get_exam(user_id, simulado_id).await?;
            if !exam.question_ids.contains(&question.id) {
                return Err(SimuladoError::Validation(format!(
                    "question {} is not part of simulado {simulado_id}",
                    question.id
                )));
            }
        }

        let answer = self
            .storage
            .create_answer(NewAnswer {
                user_id: user_id.to_string(),
                question_id: question.id.clone(),
                subject: question.subject.clone(),
                simulado_id: submission.simulado_id,
                is_correct: question.is_correct(&submission.selected_alternative),
                selected_alternative: submission.selected_alternative,
                time_spent: submission.time_spent,
            })
            .await?;

        let outcome = statistics::aggregate(self.storage.as_ref(), &answer).await;
        let rollup_warnings = outcome.warnings();

        tracing::info!(
            %user_id,
            question_id = %answer.question_id,
            correct = answer.is_correct,
            rollups_ok = rollup_warnings.is_empty(),
            "recorded answer"
        );

        Ok(SubmittedAnswer {
            answer,
            rollup_warnings,
        })
    }

    pub async fn list_answers(
        &self,
        user_id: &str,
        question_id: Option<&str>,
        simulado_id: Option<&str>,
    ) -> Result<Vec<AnswerRecord>> {
        Ok(self
            .storage
            .list_user_answers(user_id, question_id, simulado_id)
            .await?)
    }

    // -- statistics --------------------------------------------------------

    pub async fn list_stats(
        &self,
        user_id: &str,
        subject: Option<&str>,
    ) -> Result<Vec<UserSubjectStats>> {
        Ok(self
            .storage
            .list_user_subject_stats(user_id, subject)
            .await?)
    }

    /// Rebuild every subject rollup of `user_id` from the answer log.
    pub async fn recompute_user(&self, user_id: &str) -> Result<RecomputeSummary> {
        Ok(statistics::recompute_user(self.storage.as_ref(), user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::model::{Alternative, Difficulty, UserType};

    fn engine_with(storage: Arc<MemoryStorage>) -> SimuladoEngine {
        SimuladoEngine::new(storage, SelectionPolicy::default()).with_seed(11)
    }

    fn new_question(subject: &str, difficulty: Difficulty) -> NewQuestion {
        NewQuestion {
            title: format!("{subject} - {difficulty}"),
            statement: "Assinale a alternativa correta.".into(),
            alternatives: vec![
                Alternative {
                    id: "a".into(),
                    text: "Primeira".into(),
                },
                Alternative {
                    id: "b".into(),
                    text: "Segunda".into(),
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

    async fn seed_bank(engine: &SimuladoEngine) {
        for subject in ["Matemática", "Português"] {
            for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
                for _ in 0..4 {
                    engine
                        .create_question(new_question(subject, difficulty))
                        .await
                        .unwrap();
                }
            }
        }
    }

    fn profile(subjects: &[&str]) -> ProfileInput {
        ProfileInput {
            user_type: UserType::Concurseiro,
            goals: vec!["Aprovação".into()],
            weekly_hours: "10-20 horas".into(),
            study_times: vec!["Noite".into()],
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            onboarding_completed: false,
        }
    }

    #[tokio::test]
    async fn adaptive_exam_without_stats_uses_medium() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;

        let generated = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Matemática".into()]),
                    total_questions: Some(5),
                    difficulty: DifficultyPolicy::Adaptive,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(generated.questions.len() <= 5);
        assert_eq!(generated.questions.len(), 4);
        assert!(generated
            .questions
            .iter()
            .all(|q| q.subject == "Matemática" && q.difficulty == Difficulty::Medium && q.is_active));
        assert_eq!(generated.exam.status, ExamStatus::NotStarted);
        assert_eq!(generated.exam.exam_type, ExamType::Practice);
        assert_eq!(generated.exam.time_limit, Some(10));
        assert_eq!(generated.exam.total_questions, 5);
        assert_eq!(
            generated.exam.question_ids,
            generated.questions.iter().map(|q| q.id.clone()).collect::<Vec<_>>()
        );
        assert!(generated.exam.title.starts_with("Simulado Inteligente - "));
    }

    #[tokio::test]
    async fn large_request_is_underfilled_not_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;

        let generated = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Matemática".into()]),
                    total_questions: Some(120),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(generated.exam.total_questions, 120);
        assert_eq!(generated.questions.len(), 4);
        assert_eq!(generated.exam.time_limit, Some(240));
    }

    #[tokio::test]
    async fn multi_subject_exam_is_truncated_to_total() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;

        let generated = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Matemática".into(), "Português".into()]),
                    total_questions: Some(5),
                    difficulty: DifficultyPolicy::Easy,
                    title: Some("Revisão".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // ceil(5 / 2) = 3 per subject, 6 candidates, truncated to 5.
        assert_eq!(generated.questions.len(), 5);
        assert!(generated
            .questions
            .iter()
            .all(|q| q.difficulty == Difficulty::Easy));
        assert_eq!(generated.exam.title, "Revisão");
        assert_eq!(generated.plan.len(), 2);
        assert!(generated.plan.iter().all(|p| p.limit == 3));
    }

    #[tokio::test]
    async fn falls_back_to_profile_subjects() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;
        engine.save_profile("u1", profile(&["Português"])).await.unwrap();

        let generated = engine
            .generate_exam("u1", ExamRequest::default())
            .await
            .unwrap();
        assert_eq!(generated.exam.subjects, vec!["Português"]);
        assert_eq!(generated.exam.total_questions, 20);
        assert_eq!(generated.exam.time_limit, Some(40));
        assert!(generated.questions.iter().all(|q| q.subject == "Português"));
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let engine = engine_with(Arc::new(MemoryStorage::new()));
        let err = engine
            .generate_exam(
                "ghost",
                ExamRequest {
                    subjects: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::NotFound { entity: "profile", .. }));
    }

    #[tokio::test]
    async fn no_resolvable_subjects_is_validation_error() {
        let engine = engine_with(Arc::new(MemoryStorage::new()));
        engine.save_profile("u1", profile(&["  "])).await.unwrap();
        let err = engine
            .generate_exam("u1", ExamRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn zero_questions_is_rejected_before_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        let err = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Matemática".into()]),
                    total_questions: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::Validation(_)));
        assert_eq!(storage.candidate_queries(), 0);
    }

    #[tokio::test]
    async fn empty_pool_yields_empty_exam_not_error() {
        let engine = engine_with(Arc::new(MemoryStorage::new()));
        let generated = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Atualidades".into()]),
                    total_questions: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(generated.questions.is_empty());
        assert!(generated.exam.question_ids.is_empty());
    }

    #[tokio::test]
    async fn adaptive_follows_stored_success_rate() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;
        storage
            .upsert_user_subject_stats(UserSubjectStats {
                user_id: "u1".into(),
                subject: "Matemática".into(),
                total_questions: 20,
                correct_answers: 17,
                average_time: 30.0,
                success_rate: 85.0,
                last_updated: Utc::now(),
            })
            .await
            .unwrap();

        let generated = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Matemática".into()]),
                    total_questions: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(generated
            .questions
            .iter()
            .all(|q| q.difficulty == Difficulty::Hard));
    }

    #[tokio::test]
    async fn submit_answer_derives_correctness_and_rolls_up() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        let q = engine
            .create_question(new_question("Matemática", Difficulty::Easy))
            .await
            .unwrap();

        let submitted = engine
            .submit_answer(
                "u1",
                AnswerSubmission {
                    question_id: q.id.clone(),
                    selected_alternative: "a".into(),
                    simulado_id: None,
                    time_spent: Some(42),
                },
            )
            .await
            .unwrap();
        assert!(submitted.answer.is_correct);
        assert!(submitted.rollup_warnings.is_empty());

        let wrong = engine
            .submit_answer(
                "u1",
                AnswerSubmission {
                    question_id: q.id.clone(),
                    selected_alternative: "b".into(),
                    simulado_id: None,
                    time_spent: None,
                },
            )
            .await
            .unwrap();
        assert!(!wrong.answer.is_correct);

        let stats = engine.list_stats("u1", Some("Matemática")).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_questions, 2);
        assert_eq!(stats[0].success_rate, 50.0);
        assert_eq!(stats[0].average_time, 42.0);

        let q = engine.get_question(&q.id).await.unwrap();
        assert_eq!(q.total_attempts, 2);
        assert_eq!(q.success_rate, 50.0);
    }

    #[tokio::test]
    async fn unknown_question_is_not_found() {
        let engine = engine_with(Arc::new(MemoryStorage::new()));
        let err = engine
            .submit_answer(
                "u1",
                AnswerSubmission {
                    question_id: "missing".into(),
                    selected_alternative: "a".into(),
                    simulado_id: None,
                    time_spent: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::NotFound { entity: "question", .. }));
    }

    #[tokio::test]
    async fn answer_survives_rollup_failure() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        let q = engine
            .create_question(new_question("Português", Difficulty::Medium))
            .await
            .unwrap();
        storage.fail_stats_upserts(true);

        let submitted = engine
            .submit_answer(
                "u1",
                AnswerSubmission {
                    question_id: q.id.clone(),
                    selected_alternative: "a".into(),
                    simulado_id: None,
                    time_spent: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(submitted.rollup_warnings.len(), 1);
        assert!(submitted.rollup_warnings[0].starts_with("subject rollup failed"));
        assert_eq!(storage.answer_count(), 1);
        // The question half still went through.
        assert_eq!(engine.get_question(&q.id).await.unwrap().total_attempts, 1);

        storage.fail_stats_upserts(false);
        let summary = engine.recompute_user("u1").await.unwrap();
        assert_eq!(summary.refreshed.len(), 1);
        assert_eq!(summary.refreshed[0].total_questions, 1);
    }

    #[tokio::test]
    async fn foreign_exam_is_a_conflict() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;
        let generated = engine
            .generate_exam(
                "owner",
                ExamRequest {
                    subjects: Some(vec!["Matemática".into()]),
                    total_questions: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = engine
            .update_exam(
                "intruder",
                &generated.exam.id,
                SimuladoUpdate {
                    status: Some(ExamStatus::Abandoned),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::Conflict(_)));

        let err = engine
            .submit_answer(
                "intruder",
                AnswerSubmission {
                    question_id: generated.exam.question_ids[0].clone(),
                    selected_alternative: "a".into(),
                    simulado_id: Some(generated.exam.id.clone()),
                    time_spent: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::Conflict(_)));
        assert_eq!(storage.answer_count(), 0);
    }

    #[tokio::test]
    async fn status_changes_stamp_timestamps() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = engine_with(storage.clone());
        seed_bank(&engine).await;
        let exam = engine
            .generate_exam(
                "u1",
                ExamRequest {
                    subjects: Some(vec!["Português".into()]),
                    total_questions: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .exam;

        let started = engine
            .update_exam(
                "u1",
                &exam.id,
                SimuladoUpdate {
                    status: Some(ExamStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(started.started_at.is_some());

        let done = engine
            .update_exam(
                "u1",
                &exam.id,
                SimuladoUpdate {
                    status: Some(ExamStatus::Completed),
                    correct_answers: Some(1),
                    score: Some(50.0),
                    time_spent: Some(300),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(done.started_at, started.started_at);
        assert_eq!(done.correct_answers, 1);

        let err = engine
            .update_exam(
                "u1",
                &exam.id,
                SimuladoUpdate {
                    score: Some(140.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SimuladoError::Validation(_)));
    }

    #[tokio::test]
    async fn create_question_rejects_bad_authoring() {
        let engine = engine_with(Arc::new(MemoryStorage::new()));
        let mut bad = new_question("Direito Penal", Difficulty::Hard);
        bad.correct_alternative = "e".into();
        let err = engine.create_question(bad).await.unwrap_err();
        assert!(matches!(err, SimuladoError::Validation(_)));
    }

    #[tokio::test]
    async fn complete_onboarding_requires_profile() {
        let engine = engine_with(Arc::new(MemoryStorage::new()));
        assert!(matches!(
            engine.complete_onboarding("u1").await,
            Err(SimuladoError::NotFound { .. })
        ));
        engine.save_profile("u1", profile(&["Informática"])).await.unwrap();
        let done = engine.complete_onboarding("u1").await.unwrap();
        assert!(done.onboarding_completed);
    }
}
