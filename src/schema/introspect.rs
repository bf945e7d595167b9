//! Catalog construction from live database introspection.

use crate::error::AppError;
use crate::schema::dialect::{Bind, IntrospectionQuery};
use crate::schema::{ColumnSchema, SchemaCatalog, TableSchema};
use crate::sql::{QueryBuf, Row, SqlExecutor};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Source of table, key and column metadata for one database.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// `(table, comment)` pairs.
    async fn list_tables(&self, database: &str) -> Result<Vec<(String, String)>, AppError>;

    async fn primary_key(&self, database: &str, table: &str) -> Result<Option<String>, AppError>;

    async fn columns(&self, database: &str, table: &str) -> Result<Vec<ColumnSchema>, AppError>;
}

/// Runs the dialect's introspection query table through an executor.
pub struct IntrospectionProvider {
    executor: Arc<dyn SqlExecutor>,
}

impl IntrospectionProvider {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    async fn run(&self, query: &IntrospectionQuery, database: &str, table: &str) -> Result<Vec<Row>, AppError> {
        let mut q = QueryBuf::raw(query.sql);
        for bind in query.binds {
            q.params.push(Value::String(match bind {
                Bind::Database => database.to_string(),
                Bind::Table => table.to_string(),
            }));
        }
        self.executor.fetch_all(&q).await
    }
}

/// Case-insensitive column lookup; dialects disagree on result casing.
fn field<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
}

fn text(row: &Row, name: &str) -> Option<String> {
    field(row, name).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn integer(row: &Row, name: &str) -> Option<i64> {
    field(row, name).and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn column_from_row(row: &Row) -> Option<ColumnSchema> {
    let name = text(row, "column_name")?;
    Some(ColumnSchema {
        name,
        nullable: text(row, "is_nullable")
            .map(|v| v.eq_ignore_ascii_case("yes"))
            .unwrap_or(true),
        data_type: text(row, "data_type").unwrap_or_default(),
        max_length: integer(row, "character_maximum_length"),
        default_value: text(row, "column_default"),
        extra: text(row, "extra").unwrap_or_default(),
    })
}

#[async_trait]
impl SchemaProvider for IntrospectionProvider {
    async fn list_tables(&self, database: &str) -> Result<Vec<(String, String)>, AppError> {
        let queries = self.executor.dialect().queries();
        let rows = self.run(&queries.list_tables, database, "").await?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                let name = text(r, "table_name")?;
                Some((name, text(r, "table_comment").unwrap_or_default()))
            })
            .collect())
    }

    async fn primary_key(&self, database: &str, table: &str) -> Result<Option<String>, AppError> {
        let queries = self.executor.dialect().queries();
        let rows = self.run(&queries.reflect_pk, database, table).await?;
        Ok(rows.first().and_then(|r| text(r, "column_name")))
    }

    async fn columns(&self, database: &str, table: &str) -> Result<Vec<ColumnSchema>, AppError> {
        let queries = self.executor.dialect().queries();
        let rows = self.run(&queries.reflect_columns, database, table).await?;
        Ok(rows.iter().filter_map(column_from_row).collect())
    }
}

/// Introspect every listed database into a fresh catalog.
pub async fn build_catalog(provider: &dyn SchemaProvider, databases: &[String]) -> Result<SchemaCatalog, AppError> {
    let mut catalog = SchemaCatalog::new();
    for database in databases {
        catalog.add_database(database);
        let tables = provider.list_tables(database).await?;
        for (name, comment) in tables {
            let primary_key = provider.primary_key(database, &name).await?;
            let columns = provider.columns(database, &name).await?;
            catalog.insert_table(
                database,
                TableSchema {
                    name,
                    comment,
                    primary_key,
                    columns,
                },
            );
        }
        tracing::debug!(database = %database, "introspected database");
    }
    tracing::info!(
        databases = databases.len(),
        tables = catalog.table_count(),
        "schema catalog built"
    );
    Ok(catalog)
}
