//! Per-table query descriptor built up while parsing one request.

use crate::error::AppError;
use crate::filter::FilterCompiler;
use crate::relation::RelationLink;
use crate::request::query::{parse_u64, sanitize, split_top_level};
use crate::schema::{Dialect, TableSchema};
use crate::sql::Row;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

static FUNCTION_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]*)\((.*)\)(?:@([A-Za-z0-9_]+))?$").expect("should compile")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewRole {
    /// The URL-addressed table.
    Primary,
    /// A later table in the path.
    Foreign,
    /// Added through `include=`.
    Include,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFn {
    Avg,
    Count,
    Min,
    Max,
    Sum,
}

impl AggregateFn {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "avg" => Some(AggregateFn::Avg),
            "count" => Some(AggregateFn::Count),
            "min" => Some(AggregateFn::Min),
            "max" => Some(AggregateFn::Max),
            "sum" => Some(AggregateFn::Sum),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            AggregateFn::Avg => "avg",
            AggregateFn::Count => "count",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Sum => "sum",
        }
    }
}

/// One entry of the SELECT list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Projection {
    /// A known column of the view's table, qualified with the table name.
    Column { table: String, name: String, alias: Option<String> },
    /// `avg|count|min|max|sum(args)`.
    Aggregate { func: AggregateFn, args: String, alias: Option<String> },
    /// Dotted, unknown or function-form text, emitted unqualified.
    Expr { sql: String, alias: Option<String> },
}

impl Projection {
    pub fn parse(raw: &str, table: &TableSchema) -> Option<Self> {
        let text = sanitize(raw, ".*(),@");
        if text.is_empty() {
            return None;
        }
        if let Some(caps) = FUNCTION_FORM.captures(&text) {
            let func = caps.get(1).map_or("", |m| m.as_str());
            let args = caps.get(2).map_or("", |m| m.as_str()).to_string();
            let alias = caps.get(3).map(|m| m.as_str().to_string());
            return Some(match AggregateFn::parse(func) {
                Some(func) => Projection::Aggregate { func, args, alias },
                None => Projection::Expr { sql: format!("{}({})", func, args), alias },
            });
        }
        let (name, alias) = match text.split_once('@') {
            Some((n, a)) => (n.to_string(), Some(sanitize(a, "")).filter(|a| !a.is_empty())),
            None => (text, None),
        };
        if table.has_column(&name) {
            Some(Projection::Column { table: table.name.clone(), name, alias })
        } else {
            Some(Projection::Expr { sql: name, alias })
        }
    }

    /// Bare column name, when this entry projects a plain column.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Projection::Column { name, .. } => Some(name),
            Projection::Expr { sql, .. } => Some(sql.rsplit('.').next().unwrap_or(sql)),
            Projection::Aggregate { .. } => None,
        }
    }

    /// Name the value carries in the result row.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Projection::Column { alias: Some(a), .. }
            | Projection::Aggregate { alias: Some(a), .. }
            | Projection::Expr { alias: Some(a), .. } => Some(a),
            Projection::Column { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        let (body, alias) = match self {
            Projection::Column { table, name, alias } => (
                format!("{}.{}", dialect.quote_ident(table), dialect.quote_ident(name)),
                alias,
            ),
            Projection::Aggregate { func, args, alias } => (format!("{}({})", func.sql(), args), alias),
            Projection::Expr { sql, alias } => (sql.clone(), alias),
        };
        match alias {
            Some(a) => format!("{} AS {}", body, a),
            None => body,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    LeftOuter,
    Right,
    RightOuter,
    FullOuter,
    Cross,
}

impl JoinKind {
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "inner" => Some(JoinKind::Inner),
            "left" => Some(JoinKind::Left),
            "leftouter" => Some(JoinKind::LeftOuter),
            "right" => Some(JoinKind::Right),
            "rightouter" => Some(JoinKind::RightOuter),
            "outer" | "fullouter" => Some(JoinKind::FullOuter),
            "cross" => Some(JoinKind::Cross),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub condition: Option<String>,
}

impl Join {
    pub fn to_sql(&self) -> String {
        match &self.condition {
            Some(c) => format!("{} {} ON ({})", self.kind.sql(), self.table, c),
            None => format!("{} {}", self.kind.sql(), self.table),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Direction,
}

/// Body destined for one view.
#[derive(Clone, Debug, PartialEq)]
pub enum WritePayload {
    One(Row),
    Many(Vec<Row>),
}

impl WritePayload {
    pub fn rows(&self) -> &[Row] {
        match self {
            WritePayload::One(r) => std::slice::from_ref(r),
            WritePayload::Many(rows) => rows,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResourceView {
    pub database: String,
    pub table: String,
    pub role: ViewRole,
    pub primary_key: Option<String>,
    pub schema: Arc<TableSchema>,
    /// Compiled primary-key filter from the path.
    pub id_filter: Option<String>,
    /// Raw ids behind `id_filter`.
    pub ids: Vec<String>,
    /// Compiled free-form filter fragments.
    pub filters: Vec<String>,
    columns: Vec<Projection>,
    exclude: Vec<String>,
    pub joins: Vec<Join>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Vec<OrderTerm>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub distinct: bool,
    pub values: Option<WritePayload>,
    pub relations: Vec<RelationLink>,
}

impl ResourceView {
    pub fn new(database: &str, schema: Arc<TableSchema>, role: ViewRole) -> Self {
        Self {
            database: database.to_string(),
            table: schema.name.clone(),
            role,
            primary_key: schema.primary_key.clone(),
            schema,
            id_filter: None,
            ids: Vec::new(),
            filters: Vec::new(),
            columns: Vec::new(),
            exclude: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            distinct: false,
            values: None,
            relations: Vec::new(),
        }
    }

    /// Table-qualified primary-key equality (`= id`) or membership (`IN (...)`) filter. Tables
    /// without a key ignore ids.
    pub fn set_ids(&mut self, compiler: &FilterCompiler, ids: Vec<String>) -> Result<(), AppError> {
        let Some(pk) = self.primary_key.clone() else {
            tracing::debug!(table = %self.table, "ids ignored: table has no primary key");
            return Ok(());
        };
        if ids.is_empty() {
            return Ok(());
        }
        self.id_filter = Some(compiler.equality(&self.table, &pk, &ids)?);
        self.ids = ids;
        Ok(())
    }

    pub fn add_filter(&mut self, compiler: &FilterCompiler, raw: &str) -> Result<(), AppError> {
        let sql = compiler.compile(raw)?;
        if !sql.is_empty() {
            self.filters.push(sql);
        }
        Ok(())
    }

    /// Add an already-compiled fragment.
    pub fn push_filter_sql(&mut self, sql: String) {
        if !sql.is_empty() {
            self.filters.push(sql);
        }
    }

    /// AND of the id filter and every free filter, each parenthesized.
    pub fn where_clause(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .id_filter
            .iter()
            .chain(self.filters.iter())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(format!("({})", parts.join(") AND (")))
        }
    }

    pub fn add_columns(&mut self, raw: &str) {
        for item in split_top_level(raw) {
            if let Some(p) = Projection::parse(&item, &self.schema) {
                self.columns.push(p);
            }
        }
    }

    pub fn add_exclude(&mut self, raw: &str) {
        self.exclude
            .extend(split_top_level(raw).iter().map(|c| sanitize(c, ".")).filter(|c| !c.is_empty()));
    }

    fn is_excluded(&self, p: &Projection) -> bool {
        let Some(name) = p.column_name() else {
            return false;
        };
        self.exclude.iter().any(|e| {
            e == name || e.rsplit_once('.').is_some_and(|(t, c)| t == self.table && c == name)
        })
    }

    /// Requested columns, or every known column when only `exclude` was given, minus exclusions.
    /// Empty means `*`.
    pub fn projection(&self) -> Vec<Projection> {
        let base: Vec<Projection> = if !self.columns.is_empty() {
            self.columns.clone()
        } else if !self.exclude.is_empty() {
            self.schema
                .columns
                .iter()
                .map(|c| Projection::Column {
                    table: self.table.clone(),
                    name: c.name.clone(),
                    alias: None,
                })
                .collect()
        } else {
            return Vec::new();
        };
        base.into_iter().filter(|p| !self.is_excluded(p)).collect()
    }

    /// `field[,asc|desc]` pairs; a field without a direction inherits the previous one.
    pub fn add_order(&mut self, raw: &str) {
        let mut direction = self.order_by.last().map_or(Direction::Asc, |t| t.direction);
        for token in split_top_level(raw) {
            match token.to_lowercase().as_str() {
                "asc" | "desc" => {
                    direction = if token.eq_ignore_ascii_case("desc") { Direction::Desc } else { Direction::Asc };
                    if let Some(last) = self.order_by.last_mut() {
                        last.direction = direction;
                    }
                }
                _ => {
                    let field = sanitize(&token, ".*()-");
                    if !field.is_empty() {
                        self.order_by.push(OrderTerm { field, direction });
                    }
                }
            }
        }
    }

    pub fn order_clause(&self) -> Option<String> {
        if self.order_by.is_empty() {
            return None;
        }
        Some(
            self.order_by
                .iter()
                .map(|t| {
                    format!(
                        "{} {}",
                        t.field,
                        match t.direction {
                            Direction::Asc => "ASC",
                            Direction::Desc => "DESC",
                        }
                    )
                })
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// `page` or `page,size`.
    pub fn set_page(&mut self, raw: &str, default_size: u64) {
        let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == ',').collect();
        match cleaned.split_once(',') {
            Some((page, size)) => {
                if let (Some(page), Some(size)) = (parse_u64(page), parse_u64(size)) {
                    self.limit = Some(size);
                    self.offset = Some(page.saturating_mul(size));
                }
            }
            None => {
                if let Some(page) = parse_u64(&cleaned) {
                    self.limit = Some(default_size);
                    self.offset = Some(page.saturating_mul(default_size));
                }
            }
        }
    }

    pub fn set_start(&mut self, raw: &str) {
        if let Some(n) = parse_u64(raw) {
            self.offset = Some(n);
        }
    }

    pub fn set_length(&mut self, raw: &str) {
        if let Some(n) = parse_u64(raw) {
            self.limit = Some(n);
        }
    }

    /// `type,table,condition...`; the type defaults to inner.
    pub fn add_join(&mut self, compiler: &FilterCompiler, raw: &str) -> Result<(), AppError> {
        let raw = raw.replace('"', "'");
        let mut parts = split_top_level(&raw).into_iter().peekable();
        let kind = match parts.peek().and_then(|p| JoinKind::parse(p)) {
            Some(k) => {
                parts.next();
                k
            }
            None => JoinKind::Inner,
        };
        let Some(table) = parts.next().map(|t| sanitize(&t, ".-")).filter(|t| !t.is_empty()) else {
            return Err(AppError::BadRequest(format!("join '{}' names no table", raw)));
        };
        let rest: Vec<String> = parts.collect();
        let condition = if rest.is_empty() {
            None
        } else {
            Some(compiler.compile_condition(&rest.join(","))?).filter(|c| !c.is_empty())
        };
        self.joins.push(Join { kind, table, condition });
        Ok(())
    }

    pub fn add_group(&mut self, raw: &str) {
        self.group_by.extend(
            split_top_level(raw)
                .iter()
                .map(|g| sanitize(g, ".*()-"))
                .filter(|g| !g.is_empty()),
        );
    }

    pub fn set_having(&mut self, compiler: &FilterCompiler, raw: &str) -> Result<(), AppError> {
        let sql = compiler.compile(&raw.replace('"', "'"))?;
        self.having = Some(sql).filter(|s| !s.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;

    fn users() -> ResourceView {
        let schema = TableSchema::new(
            "users",
            Some("id"),
            vec![
                ColumnSchema::new("id", "integer"),
                ColumnSchema::new("name", "text"),
                ColumnSchema::new("email", "text"),
            ],
        );
        ResourceView::new("public", Arc::new(schema), ViewRole::Primary)
    }

    fn pg() -> FilterCompiler {
        FilterCompiler::new(Dialect::Postgres)
    }

    fn rendered(view: &ResourceView) -> Vec<String> {
        view.projection().iter().map(|p| p.to_sql(Dialect::Postgres)).collect()
    }

    #[test]
    fn where_parenthesizes_every_source() {
        let mut v = users();
        v.set_ids(&pg(), vec!["3".into()]).unwrap();
        v.add_filter(&pg(), "name,eq,a,or,name,eq,b").unwrap();
        assert_eq!(
            v.where_clause().unwrap(),
            "(\"users\".\"id\" = 3) AND (name = 'a' OR name = 'b')"
        );
    }

    #[test]
    fn exclude_subtracts_from_known_columns() {
        let mut v = users();
        v.add_exclude("email");
        assert_eq!(rendered(&v), vec!["\"users\".\"id\"", "\"users\".\"name\""]);
    }

    #[test]
    fn columns_qualify_known_names_and_parse_aggregates() {
        let mut v = users();
        v.add_columns("name,count(id)@total,orders.total,coalesce(name,email)@label");
        assert_eq!(
            rendered(&v),
            vec![
                "\"users\".\"name\"",
                "count(id) AS total",
                "orders.total",
                "coalesce(name,email) AS label"
            ]
        );
    }

    #[test]
    fn exclude_applies_after_columns() {
        let mut v = users();
        v.add_columns("id,name,email");
        v.add_exclude("users.email");
        assert_eq!(rendered(&v), vec!["\"users\".\"id\"", "\"users\".\"name\""]);
    }

    #[test]
    fn order_inherits_previous_direction() {
        let mut v = users();
        v.add_order("name,desc,email");
        v.add_order("id");
        assert_eq!(v.order_clause().unwrap(), "name DESC, email DESC, id DESC");
        let mut fresh = users();
        fresh.add_order("name");
        assert_eq!(fresh.order_clause().unwrap(), "name ASC");
    }

    #[test]
    fn page_and_overrides() {
        let mut v = users();
        v.set_page("2,10", 20);
        assert_eq!((v.offset, v.limit), (Some(20), Some(10)));
        v.set_page("3", 20);
        assert_eq!((v.offset, v.limit), (Some(60), Some(20)));
        v.set_start("5");
        v.set_length("7");
        assert_eq!((v.offset, v.limit), (Some(5), Some(7)));
    }

    #[test]
    fn joins_normalize_type_synonyms() {
        let mut v = users();
        v.add_join(&pg(), "leftouter,orders,orders.user_id,eq,users.id").unwrap();
        v.add_join(&pg(), "profiles,profiles.user_id,eq,users.id").unwrap();
        v.add_join(&pg(), "cross,tags").unwrap();
        let sql: Vec<String> = v.joins.iter().map(Join::to_sql).collect();
        assert_eq!(
            sql,
            vec![
                "LEFT OUTER JOIN orders ON (orders.user_id = users.id)",
                "INNER JOIN profiles ON (profiles.user_id = users.id)",
                "CROSS JOIN tags"
            ]
        );
    }

    #[test]
    fn having_swaps_double_quotes() {
        let mut v = users();
        v.set_having(&pg(), "count(id),gt,\"5\"").unwrap();
        assert_eq!(v.having.as_deref(), Some("count(id) > '5'"));
    }
}
