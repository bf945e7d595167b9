//! Executes parsed views: GET fan-out, transactional writes, cascading inserts and scoped deletes.

use crate::error::AppError;
use crate::filter::FilterCompiler;
use crate::relation::{delete_order, join_key, merge_results, write_order};
use crate::request::{ParsedViews, ResourceView, ViewRole, WritePayload};
use crate::schema::Dialect;
use crate::sql::{builder, Row, SqlExecutor, SqlTransaction};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct CommandExecutor {
    executor: Arc<dyn SqlExecutor>,
    insert_chunk_size: usize,
}

/// Turn a JSON body into a payload; arrays must hold objects.
pub fn payload_from(body: Value) -> Result<WritePayload, AppError> {
    match body {
        Value::Object(row) => Ok(WritePayload::One(row)),
        Value::Array(items) if items.is_empty() => Err(AppError::BadRequest("empty payload".into())),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                _ => Err(AppError::BadRequest("array payload must contain objects".into())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(WritePayload::Many),
        _ => Err(AppError::BadRequest("body must be a JSON object or array".into())),
    }
}

/// Hand the body to the views. With relations declared, an object keyed by view table names is
/// split per table; anything else belongs to the primary view.
pub fn assign_payloads(parsed: &mut ParsedViews, body: Value) -> Result<(), AppError> {
    let keyed = match &body {
        Value::Object(map) if !parsed.relations.is_empty() => parsed
            .views
            .iter()
            .any(|v| map.get(&v.table).is_some_and(|x| x.is_object() || x.is_array())),
        _ => false,
    };
    if !keyed {
        parsed.views[0].values = Some(payload_from(body)?);
        return Ok(());
    }
    let Value::Object(mut map) = body else {
        return Ok(());
    };
    for view in parsed.views.iter_mut() {
        if let Some(value) = map.remove(&view.table) {
            view.values = Some(payload_from(value)?);
        }
    }
    if parsed.views[0].values.is_none() {
        return Err(AppError::BadRequest(format!(
            "payload has no entry for table '{}'",
            parsed.views[0].table
        )));
    }
    Ok(())
}

fn conjunction(parts: &[String]) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(format!("({})", parts.join(") AND (")))
    }
}

/// Equality on the primary key taken from a body row.
fn key_filter(view: &ResourceView, row: &Row, compiler: &FilterCompiler) -> Result<Option<String>, AppError> {
    let Some(pk) = view.primary_key.as_deref() else {
        return Ok(None);
    };
    match row.get(pk).and_then(join_key) {
        Some(value) => Ok(Some(compiler.equality(&view.table, pk, &[value])?)),
        None => Ok(None),
    }
}

/// Scope for one array element: its own key plus the free filters. The path id filter is ignored.
fn element_scope(view: &ResourceView, row: &Row, compiler: &FilterCompiler) -> Result<Option<String>, AppError> {
    let Some(key) = key_filter(view, row, compiler)? else {
        return Ok(None);
    };
    let mut parts = vec![key];
    parts.extend(view.filters.iter().cloned());
    Ok(conjunction(&parts))
}

/// `fk IN (parent ids)` for every link where this view is the child of a view addressed by id.
fn relation_scope(parsed: &ParsedViews, idx: usize, compiler: &FilterCompiler) -> Result<Vec<String>, AppError> {
    let view = &parsed.views[idx];
    let mut out = Vec::new();
    for link in parsed
        .relations
        .iter()
        .filter(|l| l.foreign_table == view.table && l.primary_table != view.table)
    {
        let Some(parent) = parsed.view(&link.primary_table) else {
            continue;
        };
        if parent.ids.is_empty() || parent.primary_key.as_deref() != Some(link.primary_column.as_str()) {
            continue;
        }
        out.push(compiler.equality(&view.table, &link.foreign_column, &parent.ids)?);
    }
    Ok(out)
}

fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

fn shape(payload: &WritePayload, ids: Vec<Value>) -> Value {
    match payload {
        WritePayload::One(_) => ids.into_iter().next().unwrap_or(Value::Null),
        WritePayload::Many(_) => Value::Array(ids),
    }
}

fn keyed(table: &str, value: Value) -> Value {
    let mut out = Map::new();
    out.insert(table.to_string(), value);
    Value::Object(out)
}

/// Collect indexed task results in order. The first failure aborts every sibling still running.
async fn gather<T>(mut set: JoinSet<(usize, Result<T, AppError>)>, len: usize) -> Result<Vec<T>, AppError>
where
    T: Default + Send + 'static,
{
    let mut slots: Vec<T> = (0..len).map(|_| T::default()).collect();
    while let Some(joined) = set.join_next().await {
        let err = match joined {
            Ok((i, Ok(value))) => {
                slots[i] = value;
                continue;
            }
            Ok((_, Err(e))) => e,
            Err(e) => AppError::Task(e),
        };
        tracing::warn!(error = %err, pending = set.len(), "statement failed; aborting siblings");
        set.abort_all();
        return Err(err);
    }
    Ok(slots)
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Box<dyn SqlTransaction>, result: Result<T, AppError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tracing::warn!(error = %e, "rolling back transaction");
            if let Err(rb) = tx.rollback().await {
                tracing::warn!(error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}

impl CommandExecutor {
    pub fn new(executor: Arc<dyn SqlExecutor>, insert_chunk_size: usize) -> Self {
        Self {
            executor,
            insert_chunk_size: insert_chunk_size.max(1),
        }
    }

    fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    fn compiler(&self) -> FilterCompiler {
        FilterCompiler::new(self.dialect())
    }

    /// One SELECT per view, run concurrently, then nested per the declared relations.
    pub async fn get(&self, parsed: &ParsedViews) -> Result<Value, AppError> {
        let dialect = self.dialect();
        let compiler = self.compiler();
        let mut queries = Vec::with_capacity(parsed.views.len());
        for (idx, view) in parsed.views.iter().enumerate() {
            let scope = relation_scope(parsed, idx, &compiler)?;
            if scope.is_empty() {
                queries.push(builder::select(view, dialect));
            } else {
                let mut scoped = view.clone();
                for fragment in scope {
                    scoped.push_filter_sql(fragment);
                }
                queries.push(builder::select(&scoped, dialect));
            }
        }

        let mut set = JoinSet::new();
        for (idx, q) in queries.into_iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            set.spawn(async move { (idx, executor.fetch_all(&q).await) });
        }
        let results = gather(set, parsed.views.len()).await?;
        Ok(Value::Object(merge_results(&parsed.views, &parsed.relations, results)))
    }

    /// Insert the primary payload, then cascade into children linked to the primary table.
    /// Expects payloads already assigned with [`assign_payloads`].
    pub async fn post(&self, parsed: &ParsedViews) -> Result<Value, AppError> {
        let mut tx = self.executor.begin().await?;
        let result = self.insert_cascade(tx.as_mut(), parsed).await;
        finish(tx, result).await
    }

    async fn insert_cascade(&self, tx: &mut dyn SqlTransaction, parsed: &ParsedViews) -> Result<Value, AppError> {
        let dialect = self.dialect();
        let primary = parsed.primary();
        let payload = primary
            .values
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("missing request body".into()))?;
        let ids = self.insert_rows(tx, primary, payload.rows()).await?;
        let primary_result = shape(payload, ids);

        let mut out = Map::new();
        out.insert(primary.table.clone(), primary_result.clone());

        for idx in write_order(&parsed.views, &parsed.relations) {
            let child = &parsed.views[idx];
            if idx == 0 {
                continue;
            }
            let Some(child_payload) = &child.values else {
                continue;
            };
            let Some(link) = parsed
                .relations
                .iter()
                .find(|l| l.primary_table == primary.table && l.foreign_table == child.table)
            else {
                tracing::warn!(table = %child.table, "payload ignored: no relation to the primary table");
                continue;
            };
            let WritePayload::One(parent_row) = payload else {
                return Err(AppError::BadRequest(
                    "cascading insert needs a single parent object".into(),
                ));
            };
            let parent_key = if primary.primary_key.as_deref() == Some(link.primary_column.as_str())
                && builder::returns_keys(primary, dialect)
            {
                primary_result.clone()
            } else {
                parent_row.get(&link.primary_column).cloned().unwrap_or(Value::Null)
            };
            if parent_key.is_null() {
                return Err(AppError::BadRequest(format!(
                    "cannot resolve '{}.{}' for cascading insert",
                    link.primary_table, link.primary_column
                )));
            }
            let rows: Vec<Row> = child_payload
                .rows()
                .iter()
                .cloned()
                .map(|mut row| {
                    row.insert(link.foreign_column.clone(), parent_key.clone());
                    row
                })
                .collect();
            let ids = self.insert_rows(tx, child, &rows).await?;
            out.insert(child.table.clone(), shape(child_payload, ids));
        }
        Ok(Value::Object(out))
    }

    /// Chunked insert. Yields returned keys, or affected counts per chunk when the dialect has no
    /// returning clause.
    async fn insert_rows(
        &self,
        tx: &mut dyn SqlTransaction,
        view: &ResourceView,
        rows: &[Row],
    ) -> Result<Vec<Value>, AppError> {
        let dialect = self.dialect();
        let returning = builder::returns_keys(view, dialect);
        let pk = view.primary_key.clone().unwrap_or_default();
        let mut out = Vec::with_capacity(rows.len());
        for chunk in rows
            .chunks(self.insert_chunk_size)
            .flat_map(|chunk| builder::insert_batches(view, chunk, dialect))
        {
            let q = builder::insert(view, chunk, dialect)?;
            if returning {
                let returned = tx.fetch_all(&q).await?;
                out.extend(returned.into_iter().map(|mut r| r.remove(&pk).unwrap_or(Value::Null)));
            } else {
                out.push(Value::from(tx.execute(&q).await?));
            }
        }
        Ok(out)
    }

    /// UPDATE scoped by the view's filters or the body's key. Arrays update per element, concurrently.
    pub async fn patch(&self, parsed: &ParsedViews, body: Value) -> Result<Value, AppError> {
        let dialect = self.dialect();
        let compiler = self.compiler();
        let view = parsed.primary();
        let result = match payload_from(body)? {
            WritePayload::One(row) => {
                let scope = match view.where_clause() {
                    Some(w) => w,
                    None => key_filter(view, &row, &compiler)?
                        .map(|k| format!("({})", k))
                        .ok_or_else(|| {
                            AppError::BadRequest("update needs a filter or the primary key in the body".into())
                        })?,
                };
                let q = builder::update(view, &row, &scope, dialect)?;
                Value::from(self.executor.execute(&q).await?)
            }
            WritePayload::Many(rows) => {
                let mut queries = Vec::with_capacity(rows.len());
                for row in &rows {
                    let scope = element_scope(view, row, &compiler)?.ok_or_else(|| {
                        AppError::BadRequest("every array element needs its primary key".into())
                    })?;
                    queries.push(builder::update(view, row, &scope, dialect)?);
                }
                let mut set = JoinSet::new();
                for (idx, q) in queries.into_iter().enumerate() {
                    let executor = Arc::clone(&self.executor);
                    set.spawn(async move { (idx, executor.execute(&q).await) });
                }
                let counts = gather(set, rows.len()).await?;
                collapse(counts.into_iter().map(Value::from).collect())
            }
        };
        Ok(keyed(&view.table, result))
    }

    /// Update when the scoped row exists, insert otherwise. Never replaces or deletes.
    pub async fn put(&self, parsed: &ParsedViews, body: Value) -> Result<Value, AppError> {
        let view = parsed.primary();
        let payload = payload_from(body)?;
        let mut tx = self.executor.begin().await?;
        let result = self.upsert_payload(tx.as_mut(), view, &payload).await;
        let result = finish(tx, result).await?;
        Ok(keyed(&view.table, result))
    }

    async fn upsert_payload(
        &self,
        tx: &mut dyn SqlTransaction,
        view: &ResourceView,
        payload: &WritePayload,
    ) -> Result<Value, AppError> {
        let compiler = self.compiler();
        match payload {
            WritePayload::One(row) => {
                let scope = match view.where_clause() {
                    Some(w) => Some(w),
                    None => key_filter(view, row, &compiler)?.map(|k| format!("({})", k)),
                };
                self.upsert(tx, view, row, scope).await
            }
            WritePayload::Many(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let scope = element_scope(view, row, &compiler)?;
                    out.push(self.upsert(tx, view, row, scope).await?);
                }
                Ok(collapse(out))
            }
        }
    }

    async fn upsert(
        &self,
        tx: &mut dyn SqlTransaction,
        view: &ResourceView,
        row: &Row,
        scope: Option<String>,
    ) -> Result<Value, AppError> {
        let dialect = self.dialect();
        if let Some(scope) = scope {
            let present = !tx.fetch_all(&builder::exists(view, &scope, dialect)).await?.is_empty();
            if present {
                let q = builder::update(view, row, &scope, dialect)?;
                return Ok(Value::from(tx.execute(&q).await?));
            }
            tracing::debug!(table = %view.table, "no row in scope; inserting");
        }
        let mut ids = self.insert_rows(tx, view, std::slice::from_ref(row)).await?;
        Ok(ids.pop().unwrap_or(Value::Null))
    }

    /// Delete every view in children-first order. Children of a view addressed by id are limited
    /// to that parent's ids.
    pub async fn delete(&self, parsed: &ParsedViews) -> Result<Value, AppError> {
        let compiler = self.compiler();
        let mut scopes = Vec::with_capacity(parsed.views.len());
        for (idx, view) in parsed.views.iter().enumerate() {
            let mut parts: Vec<String> = view.id_filter.iter().chain(view.filters.iter()).cloned().collect();
            parts.extend(relation_scope(parsed, idx, &compiler)?);
            if parts.is_empty() {
                if view.role != ViewRole::Primary {
                    return Err(AppError::BadRequest(format!(
                        "refusing to delete every row of '{}'",
                        view.table
                    )));
                }
                tracing::warn!(table = %view.table, "delete without a filter");
            }
            scopes.push(conjunction(&parts));
        }

        let order = delete_order(&parsed.views, &parsed.relations);
        let mut tx = self.executor.begin().await?;
        let result = self.delete_in(tx.as_mut(), parsed, &order, &scopes).await;
        finish(tx, result).await
    }

    async fn delete_in(
        &self,
        tx: &mut dyn SqlTransaction,
        parsed: &ParsedViews,
        order: &[usize],
        scopes: &[Option<String>],
    ) -> Result<Value, AppError> {
        let dialect = self.dialect();
        let mut out = Map::new();
        for &idx in order {
            let view = &parsed.views[idx];
            let q = builder::delete(view, scopes[idx].as_deref(), dialect);
            let affected = tx.execute(&q).await?;
            out.insert(view.table.clone(), Value::from(affected));
        }
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationLink;
    use crate::schema::{ColumnSchema, TableSchema};
    use serde_json::json;

    fn view(table: &str, role: ViewRole) -> ResourceView {
        let cols = ["id", "parent_id", "name"].iter().map(|c| ColumnSchema::new(*c, "integer")).collect();
        ResourceView::new("main", Arc::new(TableSchema::new(table, Some("id"), cols)), role)
    }

    fn parsed(relations: Vec<RelationLink>) -> ParsedViews {
        ParsedViews {
            database: "main".into(),
            views: vec![view("parents", ViewRole::Primary), view("children", ViewRole::Foreign)],
            relations,
            passthrough: vec![],
        }
    }

    fn link() -> RelationLink {
        RelationLink::parse("parents.id,children.parent_id").unwrap()
    }

    #[test]
    fn payload_shapes() {
        assert!(matches!(payload_from(json!({"a": 1})), Ok(WritePayload::One(_))));
        assert!(matches!(payload_from(json!([{"a": 1}, {"a": 2}])), Ok(WritePayload::Many(r)) if r.len() == 2));
        assert!(payload_from(json!([])).is_err());
        assert!(payload_from(json!([1])).is_err());
        assert!(payload_from(json!("x")).is_err());
    }

    #[test]
    fn table_keyed_body_is_split_when_relations_exist() {
        let mut p = parsed(vec![link()]);
        assign_payloads(&mut p, json!({"parents": {"name": "p"}, "children": [{"name": "c"}]})).unwrap();
        assert!(matches!(p.views[0].values, Some(WritePayload::One(_))));
        assert!(matches!(&p.views[1].values, Some(WritePayload::Many(r)) if r.len() == 1));
    }

    #[test]
    fn plain_body_goes_to_primary() {
        let mut p = parsed(vec![]);
        assign_payloads(&mut p, json!({"parents": {"x": 1}, "name": "p"})).unwrap();
        assert!(p.views[1].values.is_none());
        let Some(WritePayload::One(row)) = &p.views[0].values else { panic!("expected one row") };
        assert_eq!(row.get("name"), Some(&json!("p")));
    }

    #[test]
    fn children_are_scoped_by_parent_ids() {
        let mut p = parsed(vec![link()]);
        let compiler = FilterCompiler::new(Dialect::Sqlite);
        p.views[0].set_ids(&compiler, vec!["1".into(), "2".into()]).unwrap();
        assert_eq!(relation_scope(&p, 1, &compiler).unwrap(), vec!["\"children\".\"parent_id\" IN (1,2)".to_string()]);
        assert!(relation_scope(&p, 0, &compiler).unwrap().is_empty());
    }

    #[test]
    fn element_scope_uses_key_and_free_filters() {
        let mut v = view("parents", ViewRole::Primary);
        let compiler = FilterCompiler::new(Dialect::Sqlite);
        v.set_ids(&compiler, vec!["9".into()]).unwrap();
        v.add_filter(&compiler, "name,eq,x").unwrap();
        let row: Row = serde_json::from_value(json!({"id": 3, "name": "y"})).unwrap();
        assert_eq!(
            element_scope(&v, &row, &compiler).unwrap().as_deref(),
            Some("(\"parents\".\"id\" = 3) AND (name = 'x')")
        );
        let keyless: Row = serde_json::from_value(json!({"name": "y"})).unwrap();
        assert_eq!(element_scope(&v, &keyless, &compiler).unwrap(), None);
    }

    #[test]
    fn singleton_collapses() {
        assert_eq!(collapse(vec![json!(1)]), json!(1));
        assert_eq!(collapse(vec![json!(1), json!(2)]), json!([1, 2]));
    }
}
