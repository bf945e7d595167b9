//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and existence checks from a resource view.

use crate::error::AppError;
use crate::request::{Projection, ResourceView};
use crate::schema::{ColumnSchema, Dialect, ReturningStyle};
use crate::sql::Row;
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        QueryBuf {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a bound value and return its placeholder text.
    fn push_param(&mut self, v: Value, dialect: Dialect) -> String {
        self.params.push(v);
        dialect.placeholder(self.params.len())
    }

    fn push_typed(&mut self, v: Value, column: &ColumnSchema, dialect: Dialect) -> String {
        let placeholder = self.push_param(v, dialect);
        match dialect.placeholder_cast(&column.data_type) {
            Some(cast) => format!("{}{}", placeholder, cast),
            None => placeholder,
        }
    }
}

fn table_ref(view: &ResourceView, dialect: Dialect) -> String {
    dialect.qualified_table(&view.database, &view.table)
}

/// Whether an INSERT on this view hands back primary keys as rows.
pub fn returns_keys(view: &ResourceView, dialect: Dialect) -> bool {
    view.primary_key.is_some() && dialect.returning() != ReturningStyle::None
}

/// A projection entry, with known columns cast where the driver cannot decode the raw type.
fn projection_sql(view: &ResourceView, p: &Projection, dialect: Dialect) -> String {
    if let Projection::Column { table, name, alias } = p {
        if let Some(cast) = view.schema.column(name).and_then(|c| dialect.projection_cast(&c.data_type)) {
            return format!(
                "{}.{}{} AS {}",
                dialect.quote_ident(table),
                dialect.quote_ident(name),
                cast,
                alias.clone().unwrap_or_else(|| dialect.quote_ident(name))
            );
        }
    }
    p.to_sql(dialect)
}

/// `*`, unless some column needs a cast. Then every column is listed, or with joins the cast
/// columns follow `*` and override the raw values of the same name.
fn select_list(view: &ResourceView, dialect: Dialect) -> String {
    let projection = view.projection();
    if !projection.is_empty() {
        return projection.iter().map(|p| projection_sql(view, p, dialect)).collect::<Vec<_>>().join(", ");
    }
    let all: Vec<Projection> = view
        .schema
        .columns
        .iter()
        .map(|c| Projection::Column {
            table: view.table.clone(),
            name: c.name.clone(),
            alias: None,
        })
        .collect();
    if !view.schema.columns.iter().any(|c| dialect.projection_cast(&c.data_type).is_some()) {
        return "*".to_string();
    }
    let listed: Vec<String> = if view.joins.is_empty() {
        all.iter().map(|p| projection_sql(view, p, dialect)).collect()
    } else {
        std::iter::once("*".to_string())
            .chain(
                all.iter()
                    .zip(&view.schema.columns)
                    .filter(|(_, c)| dialect.projection_cast(&c.data_type).is_some())
                    .map(|(p, _)| projection_sql(view, p, dialect)),
            )
            .collect()
    };
    listed.join(", ")
}

pub fn select(view: &ResourceView, dialect: Dialect) -> QueryBuf {
    let columns = select_list(view, dialect);
    let mut sql = format!(
        "SELECT {}{} FROM {}",
        if view.distinct { "DISTINCT " } else { "" },
        columns,
        table_ref(view, dialect)
    );
    for join in &view.joins {
        sql.push(' ');
        sql.push_str(&join.to_sql());
    }
    if let Some(w) = view.where_clause() {
        sql.push_str(" WHERE ");
        sql.push_str(&w);
    }
    if !view.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&view.group_by.join(", "));
    }
    if let Some(h) = &view.having {
        sql.push_str(" HAVING (");
        sql.push_str(h);
        sql.push(')');
    }
    let order = view.order_clause();
    if let Some(o) = &order {
        sql.push_str(" ORDER BY ");
        sql.push_str(o);
    }
    sql.push_str(&dialect.paginate(view.offset, view.limit, order.is_some()));
    QueryBuf::raw(sql)
}

/// `SELECT 1` existence check limited to one row.
pub fn exists(view: &ResourceView, where_clause: &str, dialect: Dialect) -> QueryBuf {
    let mut sql = format!("SELECT 1 AS present FROM {} WHERE {}", table_ref(view, dialect), where_clause);
    sql.push_str(&dialect.paginate(None, Some(1), false));
    QueryBuf::raw(sql)
}

fn known_keys<'r>(view: &ResourceView, row: &'r Row) -> Vec<&'r str> {
    let mut keys: Vec<&str> = row.keys().map(String::as_str).filter(|k| view.schema.has_column(k)).collect();
    keys.sort_unstable();
    keys
}

/// Consecutive runs of rows that can share one multi-row INSERT. Without a `DEFAULT` keyword every
/// row of a run carries the same known columns, so no omitted column is written as NULL.
pub fn insert_batches<'r>(view: &ResourceView, rows: &'r [Row], dialect: Dialect) -> Vec<&'r [Row]> {
    if rows.is_empty() {
        return Vec::new();
    }
    if dialect.supports_default_keyword() {
        return vec![rows];
    }
    let mut batches = Vec::new();
    let mut start = 0;
    for i in 1..rows.len() {
        if known_keys(view, &rows[i]) != known_keys(view, &rows[i - 1]) {
            batches.push(&rows[start..i]);
            start = i;
        }
    }
    batches.push(&rows[start..]);
    batches
}

/// Multi-row INSERT over the union of known columns; unknown keys are skipped.
pub fn insert(view: &ResourceView, rows: &[Row], dialect: Dialect) -> Result<QueryBuf, AppError> {
    let mut columns: Vec<&ColumnSchema> = Vec::new();
    for row in rows {
        for key in row.keys() {
            match view.schema.column(key) {
                Some(col) if !columns.iter().any(|c| c.name == col.name) => columns.push(col),
                Some(_) => {}
                None => tracing::debug!(table = %view.table, column = %key, "skipping unknown column"),
            }
        }
    }
    if columns.is_empty() {
        return Err(AppError::BadRequest(format!("no writable columns for table '{}'", view.table)));
    }

    let mut q = QueryBuf::new();
    let names: Vec<String> = columns.iter().map(|c| dialect.quote_ident(&c.name)).collect();
    let mut sql = format!("INSERT INTO {} ({})", table_ref(view, dialect), names.join(", "));
    let returning = returns_keys(view, dialect);
    if let (true, Some(pk)) = (returning && dialect.returning() == ReturningStyle::Output, &view.primary_key) {
        sql.push_str(&format!(" OUTPUT INSERTED.{}", dialect.quote_ident(pk)));
    }
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let values: Vec<String> = columns
            .iter()
            .map(|col| match row.get(&col.name) {
                Some(v) => q.push_typed(v.clone(), col, dialect),
                None => dialect.missing_value().to_string(),
            })
            .collect();
        tuples.push(format!("({})", values.join(", ")));
    }
    sql.push_str(" VALUES ");
    sql.push_str(&tuples.join(", "));
    if let (true, Some(pk)) = (returning && dialect.returning() == ReturningStyle::Returning, &view.primary_key) {
        sql.push_str(&format!(" RETURNING {}", dialect.quote_ident(pk)));
    }
    q.sql = sql;
    Ok(q)
}

/// UPDATE of the known, non-key columns in `values`.
pub fn update(view: &ResourceView, values: &Row, where_clause: &str, dialect: Dialect) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (key, v) in values {
        if view.primary_key.as_deref() == Some(key.as_str()) {
            continue;
        }
        let Some(col) = view.schema.column(key) else {
            tracing::debug!(table = %view.table, column = %key, "skipping unknown column");
            continue;
        };
        let placeholder = q.push_typed(v.clone(), col, dialect);
        sets.push(format!("{} = {}", dialect.quote_ident(&col.name), placeholder));
    }
    if sets.is_empty() {
        return Err(AppError::BadRequest(format!("no updatable columns for table '{}'", view.table)));
    }
    q.sql = format!("UPDATE {} SET {} WHERE {}", table_ref(view, dialect), sets.join(", "), where_clause);
    Ok(q)
}

pub fn delete(view: &ResourceView, where_clause: Option<&str>, dialect: Dialect) -> QueryBuf {
    match where_clause {
        Some(w) => QueryBuf::raw(format!("DELETE FROM {} WHERE {}", table_ref(view, dialect), w)),
        None => QueryBuf::raw(format!("DELETE FROM {}", table_ref(view, dialect))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterCompiler;
    use crate::request::ViewRole;
    use crate::schema::TableSchema;
    use serde_json::json;
    use std::sync::Arc;

    fn users(database: &str) -> ResourceView {
        let schema = TableSchema::new(
            "users",
            Some("id"),
            vec![
                ColumnSchema::new("id", "integer"),
                ColumnSchema::new("name", "character varying"),
                ColumnSchema::new("age", "integer"),
            ],
        );
        ResourceView::new(database, Arc::new(schema), ViewRole::Primary)
    }

    fn row(v: Value) -> Row {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn select_with_filter_order_and_page() {
        let mut v = users("public");
        v.add_filter(&FilterCompiler::new(Dialect::Postgres), "age,gt,18").unwrap();
        v.add_order("name");
        v.set_page("0,10", 20);
        let q = select(&v, Dialect::Postgres);
        assert_eq!(
            q.sql,
            "SELECT * FROM \"public\".\"users\" WHERE (age > 18) ORDER BY name ASC OFFSET 0 LIMIT 10"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn select_with_projection_group_and_join() {
        let mut v = users("shop");
        v.distinct = true;
        v.add_columns("name,count(id)@total");
        v.add_group("name");
        v.add_join(&FilterCompiler::new(Dialect::MySql), "left,orders,orders.user_id,eq,users.id").unwrap();
        let q = select(&v, Dialect::MySql);
        assert_eq!(
            q.sql,
            "SELECT DISTINCT `users`.`name`, count(id) AS total FROM `shop`.`users` \
             LEFT JOIN orders ON (orders.user_id = users.id) GROUP BY name"
        );
    }

    #[test]
    fn insert_casts_postgres_placeholders_and_returns_key() {
        let v = users("public");
        let rows = vec![row(json!({"name": "Bob", "age": 30, "bogus": 1})), row(json!({"name": "Al"}))];
        let q = insert(&v, &rows, Dialect::Postgres).unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"users\" (\"name\", \"age\") \
             VALUES ($1::character varying, $2::integer), ($3::character varying, DEFAULT) RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!("Bob"), json!(30), json!("Al")]);
    }

    #[test]
    fn insert_uses_output_on_mssql_and_null_on_sqlite() {
        let v = users("dbo");
        let q = insert(&v, &[row(json!({"name": "Bob"}))], Dialect::MsSql).unwrap();
        assert_eq!(q.sql, "INSERT INTO [dbo].[users] ([name]) OUTPUT INSERTED.[id] VALUES (@P1)");
        let v = users("main");
        let rows = vec![row(json!({"name": "a"})), row(json!({"age": 1}))];
        let q = insert(&v, &rows, Dialect::Sqlite).unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"main\".\"users\" (\"name\", \"age\") VALUES (?, NULL), (NULL, ?) RETURNING \"id\""
        );
    }

    #[test]
    fn sqlite_batches_split_on_column_changes() {
        let v = users("main");
        let rows = vec![
            row(json!({"name": "a"})),
            row(json!({"name": "b", "bogus": 1})),
            row(json!({"age": 1})),
            row(json!({"age": 2, "name": "c"})),
            row(json!({"name": "d", "age": 3})),
        ];
        let sizes: Vec<usize> = insert_batches(&v, &rows, Dialect::Sqlite).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 1, 2]);
        assert_eq!(insert_batches(&v, &rows, Dialect::Postgres).len(), 1);
        assert!(insert_batches(&v, &[], Dialect::Sqlite).is_empty());
    }

    #[test]
    fn postgres_selects_numeric_and_enum_columns_as_text() {
        let schema = TableSchema::new(
            "orders",
            Some("id"),
            vec![
                ColumnSchema::new("id", "integer"),
                ColumnSchema::new("total", "numeric"),
                ColumnSchema::new("state", "USER-DEFINED"),
            ],
        );
        let mut v = ResourceView::new("public", Arc::new(schema), ViewRole::Primary);
        assert_eq!(
            select(&v, Dialect::Postgres).sql,
            "SELECT \"orders\".\"id\", \"orders\".\"total\"::text AS \"total\", \
             \"orders\".\"state\"::text AS \"state\" FROM \"public\".\"orders\""
        );
        assert_eq!(select(&v, Dialect::MySql).sql, "SELECT * FROM `public`.`orders`");

        v.add_columns("total@amount,id");
        assert_eq!(
            select(&v, Dialect::Postgres).sql,
            "SELECT \"orders\".\"total\"::text AS amount, \"orders\".\"id\" FROM \"public\".\"orders\""
        );
    }

    #[test]
    fn postgres_casts_follow_star_when_joined() {
        let schema = TableSchema::new(
            "orders",
            Some("id"),
            vec![ColumnSchema::new("id", "integer"), ColumnSchema::new("total", "numeric")],
        );
        let mut v = ResourceView::new("public", Arc::new(schema), ViewRole::Primary);
        v.add_join(&FilterCompiler::new(Dialect::Postgres), "users,users.id,eq,orders.user_id").unwrap();
        assert_eq!(
            select(&v, Dialect::Postgres).sql,
            "SELECT *, \"orders\".\"total\"::text AS \"total\" FROM \"public\".\"orders\" \
             INNER JOIN users ON (users.id = orders.user_id)"
        );
    }

    #[test]
    fn insert_without_known_columns_is_rejected() {
        let v = users("public");
        assert!(matches!(
            insert(&v, &[row(json!({"nope": 1}))], Dialect::Postgres),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn update_skips_primary_key() {
        let v = users("main");
        let q = update(&v, &row(json!({"id": 5, "name": "Bob"})), "(id = 5)", Dialect::Sqlite).unwrap();
        assert_eq!(q.sql, "UPDATE \"main\".\"users\" SET \"name\" = ? WHERE (id = 5)");
        assert_eq!(q.params, vec![json!("Bob")]);
    }

    #[test]
    fn delete_and_exists() {
        let v = users("main");
        assert_eq!(
            delete(&v, Some("(id = 1)"), Dialect::Sqlite).sql,
            "DELETE FROM \"main\".\"users\" WHERE (id = 1)"
        );
        assert_eq!(
            exists(&v, "(id = 1)", Dialect::Sqlite).sql,
            "SELECT 1 AS present FROM \"main\".\"users\" WHERE (id = 1) LIMIT 1"
        );
    }
}
