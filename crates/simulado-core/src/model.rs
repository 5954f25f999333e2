//! Core data model types for simulado.
//!
//! These are the records every storage backend persists and every layer above
//! the storage trait passes around: questions, practice exams ("simulados"),
//! answers, per-subject statistics and user profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Question difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// How an exam picks the difficulty of each subject's questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyPolicy {
    /// Per-subject difficulty driven by the user's stored success rate.
    #[default]
    Adaptive,
    Easy,
    Medium,
    Hard,
}

impl DifficultyPolicy {
    /// The fixed difficulty this policy pins, or `None` for adaptive.
    pub fn fixed(&self) -> Option<Difficulty> {
        match self {
            DifficultyPolicy::Adaptive => None,
            DifficultyPolicy::Easy => Some(Difficulty::Easy),
            DifficultyPolicy::Medium => Some(Difficulty::Medium),
            DifficultyPolicy::Hard => Some(Difficulty::Hard),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyPolicy::Adaptive => "adaptive",
            DifficultyPolicy::Easy => "easy",
            DifficultyPolicy::Medium => "medium",
            DifficultyPolicy::Hard => "hard",
        }
    }
}

impl fmt::Display for DifficultyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adaptive" => Ok(DifficultyPolicy::Adaptive),
            "easy" => Ok(DifficultyPolicy::Easy),
            "medium" => Ok(DifficultyPolicy::Medium),
            "hard" => Ok(DifficultyPolicy::Hard),
            other => Err(format!("unknown difficulty policy: {other}")),
        }
    }
}

/// Kind of practice exam.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    Diagnostic,
    #[default]
    Practice,
    MockExam,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::Diagnostic => "diagnostic",
            ExamType::Practice => "practice",
            ExamType::MockExam => "mock_exam",
        }
    }
}

impl FromStr for ExamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diagnostic" => Ok(ExamType::Diagnostic),
            "practice" => Ok(ExamType::Practice),
            "mock_exam" => Ok(ExamType::MockExam),
            other => Err(format!("unknown exam type: {other}")),
        }
    }
}

/// Lifecycle status of a practice exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::NotStarted => "not_started",
            ExamStatus::InProgress => "in_progress",
            ExamStatus::Completed => "completed",
            ExamStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for ExamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ExamStatus::NotStarted),
            "in_progress" => Ok(ExamStatus::InProgress),
            "completed" => Ok(ExamStatus::Completed),
            "abandoned" => Ok(ExamStatus::Abandoned),
            other => Err(format!("unknown exam status: {other}")),
        }
    }
}

/// Who the user is preparing as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Candidate preparing for a recruitment exam.
    Concurseiro,
    /// Serving member preparing for promotion.
    Militar,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Concurseiro => "concurseiro",
            UserType::Militar => "militar",
        }
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concurseiro" => Ok(UserType::Concurseiro),
            "militar" => Ok(UserType::Militar),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: String,
    pub text: String,
}

/// A question in the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub title: String,
    pub statement: String,
    pub alternatives: Vec<Alternative>,
    pub correct_alternative: String,
    #[serde(default)]
    pub explanation: Option<String>,
    /// Subject ("disciplina"), e.g. "Matemática".
    pub subject: String,
    /// Exam board ("banca"), e.g. "VUNESP".
    #[serde(default)]
    pub exam_board: Option<String>,
    #[serde(default)]
    pub exam_year: Option<i32>,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Percentage of correct attempts, 0–100, two decimal places.
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub total_attempts: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    /// Whether `alternative_id` is this question's correct option.
    pub fn is_correct(&self, alternative_id: &str) -> bool {
        self.correct_alternative == alternative_id
    }
}

/// Input for authoring a new question. Rollup fields start at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub title: String,
    pub statement: String,
    pub alternatives: Vec<Alternative>,
    pub correct_alternative: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub exam_board: Option<String>,
    #[serde(default)]
    pub exam_year: Option<i32>,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewQuestion {
    /// Authoring problems that make this question unusable. Empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.title.trim().is_empty() {
            problems.push("title is empty".to_string());
        }
        if self.statement.trim().is_empty() {
            problems.push("statement is empty".to_string());
        }
        if self.subject.trim().is_empty() {
            problems.push("subject is empty".to_string());
        }
        if self.alternatives.len() < 2 {
            problems.push(format!(
                "needs at least two alternatives, has {}",
                self.alternatives.len()
            ));
        }
        for (i, alt) in self.alternatives.iter().enumerate() {
            if self.alternatives[..i].iter().any(|a| a.id == alt.id) {
                problems.push(format!("duplicate alternative id '{}'", alt.id));
            }
        }
        if !self
            .alternatives
            .iter()
            .any(|a| a.id == self.correct_alternative)
        {
            problems.push(format!(
                "correct alternative '{}' is not one of the alternatives",
                self.correct_alternative
            ));
        }
        problems
    }
}

/// Filters for browsing the question bank. Inactive questions never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFilter {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub exam_board: Option<String>,
    #[serde(default)]
    pub exam_year: Option<i32>,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl QuestionFilter {
    /// Filter used by exam generation: one subject at one difficulty.
    pub fn candidates(subject: &str, difficulty: Difficulty, limit: usize) -> Self {
        Self {
            subject: Some(subject.to_string()),
            difficulty: Some(difficulty),
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Whether `question` passes every filter (ignores limit/offset).
    pub fn matches(&self, question: &Question) -> bool {
        question.is_active
            && self.subject.as_ref().map_or(true, |s| &question.subject == s)
            && self
                .exam_board
                .as_ref()
                .map_or(true, |b| question.exam_board.as_ref() == Some(b))
            && self
                .exam_year
                .map_or(true, |y| question.exam_year == Some(y))
            && self
                .exam_type
                .as_ref()
                .map_or(true, |t| question.exam_type.as_ref() == Some(t))
            && self
                .difficulty
                .map_or(true, |d| question.difficulty == d)
    }
}

/// A generated practice exam ("simulado").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulado {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub exam_type: ExamType,
    pub subjects: Vec<String>,
    /// Requested question count; `question_ids` may hold fewer.
    pub total_questions: u32,
    /// Time limit in minutes.
    #[serde(default)]
    pub time_limit: Option<u32>,
    pub difficulty: DifficultyPolicy,
    pub status: ExamStatus,
    /// Selected questions, in presentation order. Fixed at creation.
    pub question_ids: Vec<String>,
    #[serde(default)]
    pub correct_answers: u32,
    /// Percentage score.
    #[serde(default)]
    pub score: Option<f64>,
    /// Elapsed time in seconds.
    #[serde(default)]
    pub time_spent: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for persisting a freshly generated exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSimulado {
    pub user_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub exam_type: ExamType,
    pub subjects: Vec<String>,
    pub total_questions: u32,
    pub time_limit: Option<u32>,
    pub difficulty: DifficultyPolicy,
    pub question_ids: Vec<String>,
}

/// Partial update of an exam's progress. The question list is not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimuladoUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<ExamStatus>,
    #[serde(default)]
    pub correct_answers: Option<u32>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub time_spent: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SimuladoUpdate {
    /// Apply this patch to `exam` in place.
    pub fn apply(&self, exam: &mut Simulado) {
        if let Some(title) = &self.title {
            exam.title = title.clone();
        }
        if let Some(status) = self.status {
            exam.status = status;
        }
        if let Some(correct) = self.correct_answers {
            exam.correct_answers = correct;
        }
        if let Some(score) = self.score {
            exam.score = Some(score);
        }
        if let Some(time_spent) = self.time_spent {
            exam.time_spent = Some(time_spent);
        }
        if let Some(started_at) = self.started_at {
            exam.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            exam.completed_at = Some(completed_at);
        }
    }
}

/// One recorded answer. Append-only: never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    /// Subject of the question at the time of answering.
    pub subject: String,
    /// `None` for standalone practice outside any exam.
    #[serde(default)]
    pub simulado_id: Option<String>,
    pub selected_alternative: String,
    pub is_correct: bool,
    /// Seconds spent on the question.
    #[serde(default)]
    pub time_spent: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording an answer. `is_correct` is already derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnswer {
    pub user_id: String,
    pub question_id: String,
    pub subject: String,
    pub simulado_id: Option<String>,
    pub selected_alternative: String,
    pub is_correct: bool,
    pub time_spent: Option<u32>,
}

/// Rolled-up performance of one user in one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubjectStats {
    pub user_id: String,
    pub subject: String,
    pub total_questions: u32,
    pub correct_answers: u32,
    /// Mean seconds per timed answer; answers without a time are excluded.
    pub average_time: f64,
    /// `correct / total * 100`, 0 when nothing was answered.
    pub success_rate: f64,
    pub last_updated: DateTime<Utc>,
}

/// Onboarding profile of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub user_type: UserType,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub weekly_hours: String,
    #[serde(default)]
    pub study_times: Vec<String>,
    /// Subjects the user declared interest in; the exam fallback list.
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields a user may submit during onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub user_type: UserType,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub weekly_hours: String,
    #[serde(default)]
    pub study_times: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub onboarding_completed: bool,
}

fn default_true() -> bool {
    true
}

/// Round to two decimal places, the precision rates are stored at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
