//! Executor seam between the engine and a concrete driver.

use crate::error::AppError;
use crate::schema::Dialect;
use crate::sql::QueryBuf;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row, column name to JSON value, in select order.
pub type Row = Map<String, Value>;

#[async_trait]
pub trait SqlExecutor: Send + Sync + 'static {
    fn dialect(&self) -> Dialect;

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError>;

    /// Run a statement and return the affected-row count.
    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError>;

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, AppError>;

    async fn ping(&self) -> Result<(), AppError> {
        self.fetch_all(&QueryBuf::raw("SELECT 1")).await.map(|_| ())
    }
}

/// A transaction bound to one pooled connection. Dropping without commit rolls back.
#[async_trait]
pub trait SqlTransaction: Send {
    async fn fetch_all(&mut self, q: &QueryBuf) -> Result<Vec<Row>, AppError>;

    async fn execute(&mut self, q: &QueryBuf) -> Result<u64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
