//! The HTTP API.
//!
//! Thin axum layer over [`SimuladoEngine`]: decode the request, resolve the
//! caller, call the engine, encode the result. JSON uses camelCase names.

mod error;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRef, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use simulado_core::engine::{AnswerSubmission, ExamRequest, GeneratedExam, SubmittedAnswer};
use simulado_core::model::{
    AnswerRecord, NewQuestion, ProfileInput, Question, QuestionFilter, Simulado, SimuladoUpdate,
    UserProfile, UserSubjectStats,
};
use simulado_core::SimuladoEngine;

use crate::identity::IdentityResolver;

pub use error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SimuladoEngine>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(engine: SimuladoEngine, identity: Arc<dyn IdentityResolver>) -> Self {
        Self {
            engine: Arc::new(engine),
            identity,
        }
    }
}

/// The authenticated caller.
pub struct CurrentUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        app.identity
            .resolve(&parts.headers)
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/user/profile", get(get_profile).post(save_profile))
        .route(
            "/api/user/profile/complete-onboarding",
            patch(complete_onboarding),
        )
        .route("/api/questions", get(list_questions).post(create_question))
        .route("/api/questions/:id", get(get_question))
        .route("/api/simulados", get(list_exams))
        .route("/api/simulados/generate", post(generate_exam))
        .route("/api/simulados/:id", get(get_exam).patch(update_exam))
        .route("/api/answers", get(list_answers).post(submit_answer))
        .route("/api/stats", get(list_stats))
        .route("/api/stats/recompute", post(recompute_stats))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "storage": state.engine.storage().backend(),
    }))
}

// -- profile ---------------------------------------------------------------

async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.engine.get_profile(&user).await?))
}

async fn save_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ProfileInput>, JsonRejection>,
) -> ApiResult<Json<UserProfile>> {
    let Json(input) = payload?;
    Ok(Json(state.engine.save_profile(&user, input).await?))
}

async fn complete_onboarding(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.engine.complete_onboarding(&user).await?))
}

// -- questions -------------------------------------------------------------

async fn list_questions(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    filter: Result<Query<QuestionFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Question>>> {
    let Query(filter) = filter?;
    Ok(Json(state.engine.list_questions(filter).await?))
}

async fn get_question(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Question>> {
    Ok(Json(state.engine.get_question(&id).await?))
}

async fn create_question(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    payload: Result<Json<NewQuestion>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let Json(input) = payload?;
    let question = state.engine.create_question(input).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

// -- simulados -------------------------------------------------------------

async fn list_exams(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Simulado>>> {
    Ok(Json(state.engine.list_exams(&user).await?))
}

async fn generate_exam(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ExamRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GeneratedExam>)> {
    let Json(request) = payload?;
    let generated = state.engine.generate_exam(&user, request).await?;
    Ok((StatusCode::CREATED, Json(generated)))
}

async fn get_exam(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Simulado>> {
    Ok(Json(state.engine.get_exam(&user, &id).await?))
}

async fn update_exam(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<SimuladoUpdate>, JsonRejection>,
) -> ApiResult<Json<Simulado>> {
    let Json(patch) = payload?;
    Ok(Json(state.engine.update_exam(&user, &id, patch).await?))
}

// -- answers ---------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerQuery {
    #[serde(default)]
    question_id: Option<String>,
    #[serde(default)]
    simulado_id: Option<String>,
}

async fn list_answers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<AnswerQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AnswerRecord>>> {
    let Query(query) = query?;
    let answers = state
        .engine
        .list_answers(
            &user,
            query.question_id.as_deref(),
            query.simulado_id.as_deref(),
        )
        .await?;
    Ok(Json(answers))
}

async fn submit_answer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<AnswerSubmission>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmittedAnswer>)> {
    let Json(submission) = payload?;
    let submitted = state.engine.submit_answer(&user, submission).await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

// -- statistics ------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    #[serde(default)]
    subject: Option<String>,
}

async fn list_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<UserSubjectStats>>> {
    let Query(query) = query?;
    Ok(Json(
        state
            .engine
            .list_stats(&user, query.subject.as_deref())
            .await?,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecomputeResponse {
    refreshed: Vec<UserSubjectStats>,
    failed: Vec<FailedSubject>,
    questions_refreshed: usize,
    failed_questions: Vec<FailedQuestion>,
}

#[derive(Debug, Serialize)]
struct FailedSubject {
    subject: String,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedQuestion {
    question_id: String,
    error: String,
}

async fn recompute_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<RecomputeResponse>> {
    let summary = state.engine.recompute_user(&user).await?;
    Ok(Json(RecomputeResponse {
        refreshed: summary.refreshed,
        failed: summary
            .failed
            .into_iter()
            .map(|(subject, e)| FailedSubject {
                subject,
                error: e.to_string(),
            })
            .collect(),
        questions_refreshed: summary.questions_refreshed,
        failed_questions: summary
            .failed_questions
            .into_iter()
            .map(|(question_id, e)| FailedQuestion {
                question_id,
                error: e.to_string(),
            })
            .collect(),
    }))
}
