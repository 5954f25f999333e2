//! Document storage over the Firestore REST API.
//!
//! Collections: `userProfiles` (keyed by user id), `questions`, `simulados`,
//! `userAnswers` and `userStats`. Stats documents are keyed by a name-based
//! UUID of `(user, subject)` so an upsert is a single PATCH. Answers carry
//! their question's subject so subject rollups need no join.

pub mod codec;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::instrument;
use uuid::Uuid;

use simulado_core::error::StorageError;
use simulado_core::model::{
    AnswerRecord, Difficulty, ExamStatus, NewAnswer, NewQuestion, NewSimulado, Question,
    QuestionFilter, Simulado, SimuladoUpdate, UserProfile, UserSubjectStats,
};
use simulado_core::traits::{Storage, StorageResult};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const PROFILES: &str = "userProfiles";
const QUESTIONS: &str = "questions";
const SIMULADOS: &str = "simulados";
const ANSWERS: &str = "userAnswers";
const STATS: &str = "userStats";

/// Fields of a simulado that an update may touch.
const SIMULADO_PATCH_FIELDS: &[&str] = &[
    "title",
    "status",
    "correctAnswers",
    "score",
    "timeSpent",
    "startedAt",
    "completedAt",
];

/// Firestore-backed [`Storage`].
pub struct FirestoreStorage {
    client: reqwest::Client,
    documents_url: String,
    access_token: Option<String>,
}

impl FirestoreStorage {
    pub fn new(
        project_id: &str,
        database: &str,
        access_token: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            client,
            documents_url: format!(
                "{}/v1/projects/{project_id}/databases/{database}/documents",
                base_url.trim_end_matches('/')
            ),
            access_token: access_token.filter(|t| !t.is_empty()),
        }
    }

    fn url(&self, suffix: &str) -> StorageResult<Url> {
        Url::parse(&format!("{}{suffix}", self.documents_url))
            .map_err(|e| StorageError::Backend(format!("invalid Firestore URL: {e}")))
    }

    /// URL of one document; the id is pushed as a single encoded segment.
    fn doc_url(&self, collection: &str, id: &str) -> StorageResult<Url> {
        let mut url = self.url(&format!("/{collection}"))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Backend("Firestore URL cannot take a path".into()))?
            .push(id);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> StorageResult<reqwest::Response> {
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                StorageError::Unavailable(format!(
                    "Firestore timed out after {DEFAULT_TIMEOUT_SECS}s"
                ))
            } else {
                StorageError::Unavailable(e.to_string())
            }
        })?;
        Ok(response)
    }

    async fn check(response: reqwest::Response) -> StorageResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn json_body(
        response: reqwest::Response,
        collection: &'static str,
    ) -> StorageResult<Value> {
        response.json().await.map_err(|e| StorageError::Malformed {
            collection,
            message: format!("invalid response body: {e}"),
        })
    }

    async fn get_doc<T: DeserializeOwned>(
        &self,
        collection: &'static str,
        id: &str,
    ) -> StorageResult<Option<T>> {
        if !is_valid_doc_id(id) {
            return Ok(None);
        }
        let url = self.doc_url(collection, id)?;
        let response = self.send(Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = Self::json_body(Self::check(response).await?, collection).await?;
        decode(collection, &document).map(Some)
    }

    async fn create_doc<T: Serialize>(
        &self,
        collection: &'static str,
        id: &str,
        record: &T,
    ) -> StorageResult<()> {
        if !is_valid_doc_id(id) {
            return Err(StorageError::Constraint(format!(
                "invalid {collection} document id: {id:?}"
            )));
        }
        let mut url = self.url(&format!("/{collection}"))?;
        url.query_pairs_mut().append_pair("documentId", id);
        let body = json!({ "fields": to_fields(record)? });
        let response = self.send(Method::POST, url, Some(body)).await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(StorageError::Constraint(format!(
                "{collection}/{id} already exists"
            )));
        }
        Self::check(response).await?;
        Ok(())
    }

    /// Write `fields` into a document.
    ///
    /// With a mask only the listed fields change and the document must exist;
    /// without one the whole document is replaced or created.
    async fn patch_doc(
        &self,
        collection: &'static str,
        id: &str,
        fields: Map<String, Value>,
        mask: Option<&[&str]>,
    ) -> StorageResult<()> {
        if !is_valid_doc_id(id) {
            return Err(match mask {
                Some(_) => StorageError::Missing {
                    collection,
                    id: id.to_string(),
                },
                None => StorageError::Constraint(format!(
                    "invalid {collection} document id: {id:?}"
                )),
            });
        }
        let mut url = self.doc_url(collection, id)?;
        if let Some(mask) = mask {
            let mut pairs = url.query_pairs_mut();
            for field in mask {
                pairs.append_pair("updateMask.fieldPaths", field);
            }
            pairs.append_pair("currentDocument.exists", "true");
        }
        let response = self
            .send(Method::PATCH, url, Some(json!({ "fields": fields })))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::Missing {
                collection,
                id: id.to_string(),
            });
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn run_query<T: DeserializeOwned>(
        &self,
        collection: &'static str,
        query: StructuredQuery<'_>,
    ) -> StorageResult<Vec<T>> {
        let url = self.url(":runQuery")?;
        let body = json!({ "structuredQuery": query.to_json(collection) });
        let response = Self::check(self.send(Method::POST, url, Some(body)).await?).await?;
        let rows = Self::json_body(response, collection).await?;

        let rows = rows.as_array().ok_or_else(|| StorageError::Malformed {
            collection,
            message: "runQuery did not return an array".into(),
        })?;
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(|doc| decode(collection, doc))
            .collect()
    }
}

/// Firestore ids cannot be empty, `.` or `..`, or contain `/`.
fn is_valid_doc_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}

/// Serialize a record into Firestore fields, dropping its `id` (the
/// document name carries it).
fn to_fields<T: Serialize>(record: &T) -> StorageResult<Map<String, Value>> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut map)) => {
            map.remove("id");
            Ok(codec::encode_fields(&map))
        }
        Ok(other) => Err(StorageError::Backend(format!(
            "expected an object record, got {other}"
        ))),
        Err(e) => Err(StorageError::Backend(format!("encode: {e}"))),
    }
}

fn decode<T: DeserializeOwned>(collection: &'static str, document: &Value) -> StorageResult<T> {
    let record = codec::decode_document(document)
        .map_err(|message| StorageError::Malformed { collection, message })?;
    serde_json::from_value(record).map_err(|e| StorageError::Malformed {
        collection,
        message: e.to_string(),
    })
}

/// Document id of the stats row of one (user, subject) pair.
pub fn stats_doc_id(user_id: &str, subject: &str) -> String {
    let key = format!("{user_id}\u{1f}{subject}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// A single-collection query with equality filters.
#[derive(Default)]
struct StructuredQuery<'a> {
    filters: Vec<(&'a str, Value)>,
    order_desc: Option<&'a str>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl<'a> StructuredQuery<'a> {
    fn eq(mut self, field: &'a str, value: impl Into<Value>) -> Self {
        self.filters.push((field, value.into()));
        self
    }

    fn eq_opt(self, field: &'a str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.eq(field, v),
            None => self,
        }
    }

    fn newest_first(mut self, field: &'a str) -> Self {
        self.order_desc = Some(field);
        self
    }

    fn to_json(&self, collection: &str) -> Value {
        let mut query = Map::new();
        query.insert("from".into(), json!([{ "collectionId": collection }]));

        let mut filters: Vec<Value> = self
            .filters
            .iter()
            .map(|(field, value)| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": codec::encode_value(value),
                    }
                })
            })
            .collect();
        match filters.len() {
            0 => {}
            1 => {
                query.insert("where".into(), filters.remove(0));
            }
            _ => {
                query.insert(
                    "where".into(),
                    json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
                );
            }
        }

        if let Some(field) = self.order_desc {
            query.insert(
                "orderBy".into(),
                json!([{ "field": { "fieldPath": field }, "direction": "DESCENDING" }]),
            );
        }
        if let Some(limit) = self.limit {
            query.insert("limit".into(), json!(limit));
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            query.insert("offset".into(), json!(offset));
        }
        Value::Object(query)
    }
}

#[async_trait]
impl Storage for FirestoreStorage {
    fn backend(&self) -> &str {
        "firestore"
    }

    #[instrument(skip(self))]
    async fn get_user_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>> {
        self.get_doc(PROFILES, user_id).await
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.user_id))]
    async fn save_user_profile(&self, profile: UserProfile) -> StorageResult<UserProfile> {
        self.patch_doc(PROFILES, &profile.user_id, to_fields(&profile)?, None)
            .await?;
        Ok(profile)
    }

    #[instrument(skip(self, filter), fields(subject = ?filter.subject, difficulty = ?filter.difficulty))]
    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<Question>> {
        let query = StructuredQuery::default()
            .eq_opt("subject", filter.subject.clone())
            .eq_opt("examBoard", filter.exam_board.clone())
            .eq_opt("examYear", filter.exam_year)
            .eq_opt("examType", filter.exam_type.clone())
            .eq_opt("difficulty", filter.difficulty.map(|d| d.as_str()))
            .eq("isActive", true)
            .newest_first("createdAt");
        self.run_query(
            QUESTIONS,
            StructuredQuery {
                limit: filter.limit,
                offset: filter.offset,
                ..query
            },
        )
        .await
    }

    /// Unordered, so the pool query needs no composite index.
    #[instrument(skip(self))]
    async fn active_questions(
        &self,
        subject: &str,
        difficulty: Difficulty,
        limit: usize,
    ) -> StorageResult<Vec<Question>> {
        let query = StructuredQuery::default()
            .eq("subject", subject)
            .eq("difficulty", difficulty.as_str())
            .eq("isActive", true);
        self.run_query(
            QUESTIONS,
            StructuredQuery {
                limit: Some(limit),
                ..query
            },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_question(&self, id: &str) -> StorageResult<Option<Question>> {
        self.get_doc(QUESTIONS, id).await
    }

    #[instrument(skip(self, question), fields(subject = %question.subject))]
    async fn create_question(&self, question: NewQuestion) -> StorageResult<Question> {
        let now = Utc::now();
        let question = Question {
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
        self.create_doc(QUESTIONS, &question.id, &question).await?;
        Ok(question)
    }

    #[instrument(skip(self))]
    async fn update_question_rollup(
        &self,
        question_id: &str,
        total_attempts: u32,
        success_rate: f64,
    ) -> StorageResult<()> {
        let mut record = Map::new();
        record.insert("totalAttempts".into(), json!(total_attempts));
        record.insert("successRate".into(), json!(success_rate));
        record.insert("updatedAt".into(), json!(Utc::now()));
        let fields = codec::encode_fields(&record);
        self.patch_doc(
            QUESTIONS,
            question_id,
            fields,
            Some(&["totalAttempts", "successRate", "updatedAt"]),
        )
        .await
    }

    #[instrument(skip(self, simulado), fields(user_id = %simulado.user_id))]
    async fn create_simulado(&self, simulado: NewSimulado) -> StorageResult<Simulado> {
        let simulado = Simulado {
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
        self.create_doc(SIMULADOS, &simulado.id, &simulado).await?;
        Ok(simulado)
    }

    #[instrument(skip(self))]
    async fn get_simulado(&self, id: &str) -> StorageResult<Option<Simulado>> {
        self.get_doc(SIMULADOS, id).await
    }

    #[instrument(skip(self))]
    async fn list_simulados(&self, user_id: &str) -> StorageResult<Vec<Simulado>> {
        let query = StructuredQuery::default()
            .eq("userId", user_id)
            .newest_first("createdAt");
        self.run_query(SIMULADOS, query).await
    }

    #[instrument(skip(self, update))]
    async fn update_simulado(
        &self,
        id: &str,
        update: &SimuladoUpdate,
    ) -> StorageResult<Simulado> {
        let mut exam: Simulado =
            self.get_doc(SIMULADOS, id)
                .await?
                .ok_or_else(|| StorageError::Missing {
                    collection: SIMULADOS,
                    id: id.to_string(),
                })?;
        update.apply(&mut exam);

        let mut fields = to_fields(&exam)?;
        fields.retain(|k, _| SIMULADO_PATCH_FIELDS.contains(&k.as_str()));
        self.patch_doc(SIMULADOS, id, fields, Some(SIMULADO_PATCH_FIELDS))
            .await?;
        Ok(exam)
    }

    #[instrument(skip(self, answer), fields(user_id = %answer.user_id, question_id = %answer.question_id))]
    async fn create_answer(&self, answer: NewAnswer) -> StorageResult<AnswerRecord> {
        let record = AnswerRecord {
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
        self.create_doc(ANSWERS, &record.id, &record).await?;
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_answers_for_question(
        &self,
        question_id: &str,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let query = StructuredQuery::default().eq("questionId", question_id);
        self.run_query(ANSWERS, query).await
    }

    #[instrument(skip(self))]
    async fn list_answers_for_user_subject(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let query = StructuredQuery::default()
            .eq("userId", user_id)
            .eq("subject", subject);
        self.run_query(ANSWERS, query).await
    }

    #[instrument(skip(self))]
    async fn list_user_answers(
        &self,
        user_id: &str,
        question_id: Option<&str>,
        simulado_id: Option<&str>,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let query = StructuredQuery::default()
            .eq("userId", user_id)
            .eq_opt("questionId", question_id)
            .eq_opt("simuladoId", simulado_id)
            .newest_first("createdAt");
        self.run_query(ANSWERS, query).await
    }

    #[instrument(skip(self))]
    async fn get_user_subject_stats(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Option<UserSubjectStats>> {
        self.get_doc(STATS, &stats_doc_id(user_id, subject)).await
    }

    #[instrument(skip(self))]
    async fn list_user_subject_stats(
        &self,
        user_id: &str,
        subject: Option<&str>,
    ) -> StorageResult<Vec<UserSubjectStats>> {
        let query = StructuredQuery::default()
            .eq("userId", user_id)
            .eq_opt("subject", subject)
            .newest_first("lastUpdated");
        self.run_query(STATS, query).await
    }

    #[instrument(skip(self, stats), fields(user_id = %stats.user_id, subject = %stats.subject))]
    async fn upsert_user_subject_stats(
        &self,
        stats: UserSubjectStats,
    ) -> StorageResult<UserSubjectStats> {
        let id = stats_doc_id(&stats.user_id, &stats.subject);
        self.patch_doc(STATS, &id, to_fields(&stats)?, None).await?;
        Ok(stats)
    }
}
