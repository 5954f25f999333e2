//! Relational storage over SQLite.
//!
//! One connection behind a mutex; every call runs on the blocking pool so the
//! async runtime never waits on disk I/O. List-valued fields (alternatives,
//! tags, subjects, question ids) are stored as JSON text.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tracing::instrument;
use uuid::Uuid;

use simulado_core::error::StorageError;
use simulado_core::model::{
    AnswerRecord, ExamStatus, NewAnswer, NewQuestion, NewSimulado, Question, QuestionFilter,
    Simulado, SimuladoUpdate, UserProfile, UserSubjectStats,
};
use simulado_core::traits::{Storage, StorageResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_profiles (
    user_id TEXT PRIMARY KEY,
    user_type TEXT NOT NULL,
    goals TEXT NOT NULL DEFAULT '[]',
    weekly_hours TEXT NOT NULL DEFAULT '',
    study_times TEXT NOT NULL DEFAULT '[]',
    subjects TEXT NOT NULL DEFAULT '[]',
    onboarding_completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    statement TEXT NOT NULL,
    alternatives TEXT NOT NULL,
    correct_alternative TEXT NOT NULL,
    explanation TEXT,
    subject TEXT NOT NULL,
    exam_board TEXT,
    exam_year INTEGER,
    exam_type TEXT,
    difficulty TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    success_rate REAL NOT NULL DEFAULT 0,
    total_attempts INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_pool
    ON questions (subject, difficulty, is_active);

CREATE TABLE IF NOT EXISTS simulados (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    exam_type TEXT NOT NULL,
    subjects TEXT NOT NULL,
    total_questions INTEGER NOT NULL,
    time_limit INTEGER,
    difficulty TEXT NOT NULL,
    status TEXT NOT NULL,
    question_ids TEXT NOT NULL,
    correct_answers INTEGER NOT NULL DEFAULT 0,
    score REAL,
    time_spent INTEGER,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_simulados_user ON simulados (user_id);

CREATE TABLE IF NOT EXISTS user_answers (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    question_id TEXT NOT NULL REFERENCES questions (id),
    subject TEXT NOT NULL,
    simulado_id TEXT REFERENCES simulados (id),
    selected_alternative TEXT NOT NULL,
    is_correct INTEGER NOT NULL,
    time_spent INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_answers_user ON user_answers (user_id);
CREATE INDEX IF NOT EXISTS idx_answers_question ON user_answers (question_id);

CREATE TABLE IF NOT EXISTS user_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    subject TEXT NOT NULL,
    total_questions INTEGER NOT NULL,
    correct_answers INTEGER NOT NULL,
    average_time REAL NOT NULL,
    success_rate REAL NOT NULL,
    last_updated TEXT NOT NULL,
    UNIQUE (user_id, subject)
);
";

const PROFILE_COLUMNS: &str = "user_id, user_type, goals, weekly_hours, study_times, subjects, \
     onboarding_completed, created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, title, statement, alternatives, correct_alternative, \
     explanation, subject, exam_board, exam_year, exam_type, difficulty, tags, success_rate, \
     total_attempts, is_active, created_at, updated_at";

const SIMULADO_COLUMNS: &str = "id, user_id, title, exam_type, subjects, total_questions, \
     time_limit, difficulty, status, question_ids, correct_answers, score, time_spent, \
     created_at, started_at, completed_at";

const ANSWER_COLUMNS: &str = "a.id, a.user_id, a.question_id, a.subject, a.simulado_id, \
     a.selected_alternative, a.is_correct, a.time_spent, a.created_at";

const STATS_COLUMNS: &str = "user_id, subject, total_questions, correct_answers, average_time, \
     success_rate, last_updated";

/// SQLite-backed [`Storage`].
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
        })?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(format!("failed to open in-memory db: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(sql_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("blocking task failed: {e}")))?
    }
}

fn sql_error(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StorageError::Constraint(e.to_string())
        }
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            StorageError::Unavailable(e.to_string())
        }
        _ => StorageError::Backend(e.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Backend(format!("encode: {e}")))
}

fn json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn enum_col<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        user_type: enum_col(row, 1)?,
        goals: json_col(row, 2)?,
        weekly_hours: row.get(3)?,
        study_times: json_col(row, 4)?,
        subjects: json_col(row, 5)?,
        onboarding_completed: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: row.get(0)?,
        title: row.get(1)?,
        statement: row.get(2)?,
        alternatives: json_col(row, 3)?,
        correct_alternative: row.get(4)?,
        explanation: row.get(5)?,
        subject: row.get(6)?,
        exam_board: row.get(7)?,
        exam_year: row.get(8)?,
        exam_type: row.get(9)?,
        difficulty: enum_col(row, 10)?,
        tags: json_col(row, 11)?,
        success_rate: row.get(12)?,
        total_attempts: row.get(13)?,
        is_active: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn simulado_from_row(row: &Row<'_>) -> rusqlite::Result<Simulado> {
    Ok(Simulado {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        exam_type: enum_col(row, 3)?,
        subjects: json_col(row, 4)?,
        total_questions: row.get(5)?,
        time_limit: row.get(6)?,
        difficulty: enum_col(row, 7)?,
        status: enum_col(row, 8)?,
        question_ids: json_col(row, 9)?,
        correct_answers: row.get(10)?,
        score: row.get(11)?,
        time_spent: row.get(12)?,
        created_at: row.get(13)?,
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<AnswerRecord> {
    Ok(AnswerRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        question_id: row.get(2)?,
        subject: row.get(3)?,
        simulado_id: row.get(4)?,
        selected_alternative: row.get(5)?,
        is_correct: row.get(6)?,
        time_spent: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<UserSubjectStats> {
    Ok(UserSubjectStats {
        user_id: row.get(0)?,
        subject: row.get(1)?,
        total_questions: row.get(2)?,
        correct_answers: row.get(3)?,
        average_time: row.get(4)?,
        success_rate: row.get(5)?,
        last_updated: row.get(6)?,
    })
}

fn read_simulado(conn: &Connection, id: &str) -> StorageResult<Option<Simulado>> {
    conn.query_row(
        &format!("SELECT {SIMULADO_COLUMNS} FROM simulados WHERE id = ?1"),
        params![id],
        simulado_from_row,
    )
    .optional()
    .map_err(sql_error)
}

fn collect_answers(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> StorageResult<Vec<AnswerRecord>> {
    let mut stmt = conn.prepare(sql).map_err(sql_error)?;
    let rows = stmt
        .query_map(args, answer_from_row)
        .map_err(sql_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql_error)?;
    Ok(rows)
}

#[async_trait]
impl Storage for SqliteStorage {
    fn backend(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self))]
    async fn get_user_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = ?1"),
                params![user_id],
                profile_from_row,
            )
            .optional()
            .map_err(sql_error)
        })
        .await
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.user_id))]
    async fn save_user_profile(&self, profile: UserProfile) -> StorageResult<UserProfile> {
        let goals = to_json(&profile.goals)?;
        let study_times = to_json(&profile.study_times)?;
        let subjects = to_json(&profile.subjects)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_profiles
                    (user_id, user_type, goals, weekly_hours, study_times, subjects,
                     onboarding_completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (user_id) DO UPDATE SET
                    user_type = excluded.user_type,
                    goals = excluded.goals,
                    weekly_hours = excluded.weekly_hours,
                    study_times = excluded.study_times,
                    subjects = excluded.subjects,
                    onboarding_completed = excluded.onboarding_completed,
                    updated_at = excluded.updated_at",
                params![
                    profile.user_id,
                    profile.user_type.as_str(),
                    goals,
                    profile.weekly_hours,
                    study_times,
                    subjects,
                    profile.onboarding_completed,
                    profile.created_at,
                    profile.updated_at,
                ],
            )
            .map_err(sql_error)?;
            Ok(profile)
        })
        .await
    }

    #[instrument(skip(self, filter), fields(subject = ?filter.subject, difficulty = ?filter.difficulty))]
    async fn list_questions(&self, filter: &QuestionFilter) -> StorageResult<Vec<Question>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE is_active = 1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(subject) = filter.subject {
                sql.push_str(" AND subject = ?");
                args.push(Box::new(subject));
            }
            if let Some(board) = filter.exam_board {
                sql.push_str(" AND exam_board = ?");
                args.push(Box::new(board));
            }
            if let Some(year) = filter.exam_year {
                sql.push_str(" AND exam_year = ?");
                args.push(Box::new(year));
            }
            if let Some(exam_type) = filter.exam_type {
                sql.push_str(" AND exam_type = ?");
                args.push(Box::new(exam_type));
            }
            if let Some(difficulty) = filter.difficulty {
                sql.push_str(" AND difficulty = ?");
                args.push(Box::new(difficulty.as_str()));
            }
            sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?");
            args.push(Box::new(filter.limit.map_or(-1, |l| l as i64)));
            args.push(Box::new(filter.offset.unwrap_or(0) as i64));

            let mut stmt = conn.prepare(&sql).map_err(sql_error)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), question_from_row)
                .map_err(sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error)?;
            Ok(rows)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_question(&self, id: &str) -> StorageResult<Option<Question>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
                params![id],
                question_from_row,
            )
            .optional()
            .map_err(sql_error)
        })
        .await
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
        let alternatives = to_json(&question.alternatives)?;
        let tags = to_json(&question.tags)?;
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO questions ({QUESTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    question.id,
                    question.title,
                    question.statement,
                    alternatives,
                    question.correct_alternative,
                    question.explanation,
                    question.subject,
                    question.exam_board,
                    question.exam_year,
                    question.exam_type,
                    question.difficulty.as_str(),
                    tags,
                    question.success_rate,
                    question.total_attempts,
                    question.is_active,
                    question.created_at,
                    question.updated_at,
                ],
            )
            .map_err(sql_error)?;
            Ok(question)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn update_question_rollup(
        &self,
        question_id: &str,
        total_attempts: u32,
        success_rate: f64,
    ) -> StorageResult<()> {
        let question_id = question_id.to_string();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE questions
                     SET total_attempts = ?2, success_rate = ?3, updated_at = ?4
                     WHERE id = ?1",
                    params![question_id, total_attempts, success_rate, Utc::now()],
                )
                .map_err(sql_error)?;
            if changed == 0 {
                return Err(StorageError::Missing {
                    collection: "questions",
                    id: question_id,
                });
            }
            Ok(())
        })
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
        let subjects = to_json(&simulado.subjects)?;
        let question_ids = to_json(&simulado.question_ids)?;
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO simulados ({SIMULADO_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    simulado.id,
                    simulado.user_id,
                    simulado.title,
                    simulado.exam_type.as_str(),
                    subjects,
                    simulado.total_questions,
                    simulado.time_limit,
                    simulado.difficulty.as_str(),
                    simulado.status.as_str(),
                    question_ids,
                    simulado.correct_answers,
                    simulado.score,
                    simulado.time_spent,
                    simulado.created_at,
                    simulado.started_at,
                    simulado.completed_at,
                ],
            )
            .map_err(sql_error)?;
            Ok(simulado)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_simulado(&self, id: &str) -> StorageResult<Option<Simulado>> {
        let id = id.to_string();
        self.with_conn(move |conn| read_simulado(conn, &id)).await
    }

    #[instrument(skip(self))]
    async fn list_simulados(&self, user_id: &str) -> StorageResult<Vec<Simulado>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SIMULADO_COLUMNS} FROM simulados
                     WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
                ))
                .map_err(sql_error)?;
            let rows = stmt
                .query_map(params![user_id], simulado_from_row)
                .map_err(sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error)?;
            Ok(rows)
        })
        .await
    }

    #[instrument(skip(self, update))]
    async fn update_simulado(
        &self,
        id: &str,
        update: &SimuladoUpdate,
    ) -> StorageResult<Simulado> {
        let id = id.to_string();
        let update = update.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(sql_error)?;
            let mut exam = read_simulado(&tx, &id)?.ok_or_else(|| StorageError::Missing {
                collection: "simulados",
                id: id.clone(),
            })?;
            update.apply(&mut exam);
            tx.execute(
                "UPDATE simulados
                 SET title = ?2, status = ?3, correct_answers = ?4, score = ?5,
                     time_spent = ?6, started_at = ?7, completed_at = ?8
                 WHERE id = ?1",
                params![
                    exam.id,
                    exam.title,
                    exam.status.as_str(),
                    exam.correct_answers,
                    exam.score,
                    exam.time_spent,
                    exam.started_at,
                    exam.completed_at,
                ],
            )
            .map_err(sql_error)?;
            tx.commit().map_err(sql_error)?;
            Ok(exam)
        })
        .await
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
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_answers
                    (id, user_id, question_id, subject, simulado_id, selected_alternative,
                     is_correct, time_spent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.user_id,
                    record.question_id,
                    record.subject,
                    record.simulado_id,
                    record.selected_alternative,
                    record.is_correct,
                    record.time_spent,
                    record.created_at,
                ],
            )
            .map_err(sql_error)?;
            Ok(record)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_answers_for_question(
        &self,
        question_id: &str,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let question_id = question_id.to_string();
        self.with_conn(move |conn| {
            collect_answers(
                conn,
                &format!("SELECT {ANSWER_COLUMNS} FROM user_answers a WHERE a.question_id = ?1"),
                params![question_id],
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_answers_for_user_subject(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let user_id = user_id.to_string();
        let subject = subject.to_string();
        self.with_conn(move |conn| {
            collect_answers(
                conn,
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM user_answers a
                     JOIN questions q ON q.id = a.question_id
                     WHERE a.user_id = ?1 AND q.subject = ?2"
                ),
                params![user_id, subject],
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_user_answers(
        &self,
        user_id: &str,
        question_id: Option<&str>,
        simulado_id: Option<&str>,
    ) -> StorageResult<Vec<AnswerRecord>> {
        let user_id = user_id.to_string();
        let question_id = question_id.map(str::to_string);
        let simulado_id = simulado_id.map(str::to_string);
        self.with_conn(move |conn| {
            collect_answers(
                conn,
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM user_answers a
                     WHERE a.user_id = ?1
                       AND (?2 IS NULL OR a.question_id = ?2)
                       AND (?3 IS NULL OR a.simulado_id = ?3)
                     ORDER BY a.created_at DESC, a.rowid DESC"
                ),
                params![user_id, question_id, simulado_id],
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_user_subject_stats(
        &self,
        user_id: &str,
        subject: &str,
    ) -> StorageResult<Option<UserSubjectStats>> {
        let user_id = user_id.to_string();
        let subject = subject.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {STATS_COLUMNS} FROM user_stats WHERE user_id = ?1 AND subject = ?2"
                ),
                params![user_id, subject],
                stats_from_row,
            )
            .optional()
            .map_err(sql_error)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_user_subject_stats(
        &self,
        user_id: &str,
        subject: Option<&str>,
    ) -> StorageResult<Vec<UserSubjectStats>> {
        let user_id = user_id.to_string();
        let subject = subject.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {STATS_COLUMNS} FROM user_stats
                     WHERE user_id = ?1 AND (?2 IS NULL OR subject = ?2)
                     ORDER BY last_updated DESC, id DESC"
                ))
                .map_err(sql_error)?;
            let rows = stmt
                .query_map(params![user_id, subject], stats_from_row)
                .map_err(sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error)?;
            Ok(rows)
        })
        .await
    }

    #[instrument(skip(self, stats), fields(user_id = %stats.user_id, subject = %stats.subject))]
    async fn upsert_user_subject_stats(
        &self,
        stats: UserSubjectStats,
    ) -> StorageResult<UserSubjectStats> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_stats
                    (user_id, subject, total_questions, correct_answers, average_time,
                     success_rate, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id, subject) DO UPDATE SET
                    total_questions = excluded.total_questions,
                    correct_answers = excluded.correct_answers,
                    average_time = excluded.average_time,
                    success_rate = excluded.success_rate,
                    last_updated = excluded.last_updated",
                params![
                    stats.user_id,
                    stats.subject,
                    stats.total_questions,
                    stats.correct_answers,
                    stats.average_time,
                    stats.success_rate,
                    stats.last_updated,
                ],
            )
            .map_err(sql_error)?;
            Ok(stats)
        })
        .await
    }
}
