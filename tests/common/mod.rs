#![allow(dead_code)]

use async_trait::async_trait;
use schema_rest::config::KNOWN_METHODS;
use schema_rest::sql::Row;
use schema_rest::{
    ApiSettings, AppError, Dialect, QueryBuf, RestEngine, SqlExecutor, SqlTransaction, SqliteExecutor,
};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Records every statement and answers `fetch_all` from a queue of scripted results.
#[derive(Clone)]
pub struct RecordingExecutor {
    dialect: Dialect,
    log: Arc<Mutex<Vec<QueryBuf>>>,
    results: Arc<Mutex<VecDeque<Vec<Row>>>>,
    /// `fetch_all` fails for statements containing this text.
    fail_on: Option<String>,
    /// `fetch_all` never completes for statements containing this text.
    stall_on: Option<String>,
}

impl RecordingExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            log: Arc::default(),
            results: Arc::default(),
            fail_on: None,
            stall_on: None,
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn stalling_on(mut self, needle: &str) -> Self {
        self.stall_on = Some(needle.to_string());
        self
    }

    pub fn push_result(&self, rows: Value) {
        let rows: Vec<Row> = serde_json::from_value(rows).unwrap();
        self.results.lock().unwrap().push_back(rows);
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|q| q.sql.clone()).collect()
    }

    pub fn queries(&self) -> Vec<QueryBuf> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, q: &QueryBuf) {
        self.log.lock().unwrap().push(q.clone());
    }

    fn next(&self) -> Vec<Row> {
        self.results.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        self.record(q);
        if self.stall_on.as_deref().is_some_and(|s| q.sql.contains(s)) {
            std::future::pending::<()>().await;
        }
        if self.fail_on.as_deref().is_some_and(|s| q.sql.contains(s)) {
            return Err(AppError::Db(sqlx::Error::Protocol("scripted failure".into())));
        }
        Ok(self.next())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        self.record(q);
        Ok(1)
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, AppError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl SqlTransaction for RecordingExecutor {
    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        self.record(q);
        Ok(self.next())
    }

    async fn execute(&mut self, q: &QueryBuf) -> Result<u64, AppError> {
        self.record(q);
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.record(&QueryBuf::raw("COMMIT"));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.record(&QueryBuf::raw("ROLLBACK"));
        Ok(())
    }
}

pub const SQLITE_DDL: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, age INTEGER)",
    "CREATE TABLE parents (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
    "CREATE TABLE children (id INTEGER PRIMARY KEY AUTOINCREMENT, parent_id INTEGER, name TEXT NOT NULL)",
    "CREATE TABLE toys (id INTEGER PRIMARY KEY AUTOINCREMENT, child_id INTEGER, name TEXT)",
    "CREATE TABLE gadgets (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, color TEXT NOT NULL DEFAULT 'red')",
];

/// Engine over a single-connection in-memory SQLite database with every method enabled.
pub async fn sqlite_engine() -> (Arc<RestEngine>, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for ddl in SQLITE_DDL {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }
    let executor: Arc<dyn SqlExecutor> = Arc::new(SqliteExecutor::new(pool.clone()));
    let settings = ApiSettings::new(Dialect::Sqlite, "main").with_methods(KNOWN_METHODS.iter().copied());
    let engine = RestEngine::bootstrap(executor, settings).await.unwrap();
    (Arc::new(engine), pool)
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
}
