//! Path and query-string parsing into resource views.

use crate::config::ApiSettings;
use crate::error::AppError;
use crate::filter::FilterCompiler;
use crate::model::{resolve_call, ModelCall, ModelRegistry};
use crate::relation::RelationLink;
use crate::request::query::{parse_query, sanitize, split_top_level, truthy, QueryParam, READ_KEYS, WRITE_KEYS};
use crate::request::{ResourceView, ViewRole};
use crate::schema::SchemaCatalog;
use percent_encoding::percent_decode_str;
use std::sync::Arc;

#[derive(Debug)]
pub enum ParsedRequest {
    /// First path segment named a registered model.
    Model(ModelCall),
    Views(ParsedViews),
}

/// Views in first-reference order; index 0 is the primary view.
#[derive(Clone, Debug)]
pub struct ParsedViews {
    pub database: String,
    pub views: Vec<ResourceView>,
    pub relations: Vec<RelationLink>,
    /// Unrecognized parameters, untouched.
    pub passthrough: Vec<QueryParam>,
}

impl ParsedViews {
    pub fn primary(&self) -> &ResourceView {
        &self.views[0]
    }

    pub fn view(&self, table: &str) -> Option<&ResourceView> {
        self.views.iter().find(|v| v.table == table)
    }
}

fn key_rank(key: &str) -> u8 {
    match key {
        "distinct" => 0,
        "filter" | "where" => 1,
        "columns" => 2,
        "exclude" => 3,
        "order" => 4,
        "page" => 5,
        "start" => 6,
        "length" => 7,
        "join" => 8,
        "group" => 9,
        "having" => 10,
        "relation" => 11,
        _ => 12,
    }
}

pub struct RequestParser<'a> {
    catalog: &'a SchemaCatalog,
    settings: &'a ApiSettings,
    models: &'a ModelRegistry,
    compiler: FilterCompiler,
}

impl<'a> RequestParser<'a> {
    pub fn new(catalog: &'a SchemaCatalog, settings: &'a ApiSettings, models: &'a ModelRegistry) -> Self {
        Self {
            catalog,
            settings,
            models,
            compiler: FilterCompiler::new(settings.dialect),
        }
    }

    /// Parse `/[database/]table[/ids][/table[/ids]]...` plus the query string.
    /// Writes only honour `filter`, `where` and `relation`.
    pub fn parse(&self, method: &str, path: &str, query: &str, write: bool) -> Result<ParsedRequest, AppError> {
        let segments: Vec<String> = path
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8_lossy().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let params = parse_query(query);

        if let Some((first, rest)) = segments.split_first() {
            if let Some(model) = self.models.get(first) {
                let (function, args) = resolve_call(first, model.as_ref(), rest);
                return Ok(ParsedRequest::Model(ModelCall {
                    model: first.clone(),
                    function,
                    method: method.to_string(),
                    args,
                    query: params,
                    body: None,
                }));
            }
        }

        let mut database = self.settings.main_db.clone();
        let mut rest = segments.as_slice();
        if let Some((first, tail)) = rest.split_first() {
            let is_table = self.catalog.is_table(&database, first);
            if !is_table && self.catalog.is_database(first) && self.settings.databases.contains(first) {
                database = first.clone();
                rest = tail;
            }
        }

        let mut views = self.path_views(&database, rest)?;
        let allowed = if write { WRITE_KEYS } else { READ_KEYS };
        let mut params = params;
        params.sort_by_key(|p| if p.key == "include" { 0 } else { key_rank(&p.key) + 1 });

        let mut relations = Vec::new();
        let mut passthrough = Vec::new();
        for p in params {
            if !allowed.contains(&p.key.as_str()) {
                passthrough.push(p);
                continue;
            }
            if p.key == "include" {
                self.include(&database, &mut views, &p.value)?;
                continue;
            }
            if p.key == "relation" {
                let link = self.relation(&views, &p.value)?;
                for v in views.iter_mut().filter(|v| link.touches(&v.table)) {
                    v.relations.push(link.clone());
                }
                relations.push(link);
                continue;
            }
            let idx = match &p.target {
                Some(table) => views
                    .iter()
                    .position(|v| &v.table == table)
                    .ok_or_else(|| AppError::NotFound(format!("table '{}'", table)))?,
                None => 0,
            };
            self.apply(&mut views[idx], &p)?;
        }

        tracing::debug!(
            database = %database,
            views = views.len(),
            relations = relations.len(),
            "request parsed"
        );
        Ok(ParsedRequest::Views(ParsedViews {
            database,
            views,
            relations,
            passthrough,
        }))
    }

    fn path_views(&self, database: &str, segments: &[String]) -> Result<Vec<ResourceView>, AppError> {
        let mut views: Vec<ResourceView> = Vec::new();
        let mut current: Option<usize> = None;
        for seg in segments {
            if let Some(schema) = self.catalog.table(database, seg) {
                let idx = match views.iter().position(|v| &v.table == seg) {
                    Some(i) => i,
                    None => {
                        let role = if views.is_empty() { ViewRole::Primary } else { ViewRole::Foreign };
                        views.push(ResourceView::new(database, Arc::clone(schema), role));
                        views.len() - 1
                    }
                };
                current = Some(idx);
            } else if let Some(idx) = current {
                let ids: Vec<String> = seg
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                views[idx].set_ids(&self.compiler, ids)?;
            } else {
                tracing::debug!(segment = %seg, "dropping unrecognized leading segment");
            }
        }
        if views.is_empty() {
            let name = segments.last().map_or("resource", String::as_str);
            return Err(AppError::NotFound(format!("table '{}'", name)));
        }
        Ok(views)
    }

    fn include(&self, database: &str, views: &mut Vec<ResourceView>, raw: &str) -> Result<(), AppError> {
        for name in split_top_level(raw) {
            let name = sanitize(&name, "-");
            if name.is_empty() || views.iter().any(|v| v.table == name) {
                continue;
            }
            let schema = self
                .catalog
                .table(database, &name)
                .ok_or_else(|| AppError::NotFound(format!("table '{}'", name)))?;
            views.push(ResourceView::new(database, Arc::clone(schema), ViewRole::Include));
        }
        Ok(())
    }

    fn relation(&self, views: &[ResourceView], raw: &str) -> Result<RelationLink, AppError> {
        let link = RelationLink::parse(raw)?;
        for (table, column) in [
            (&link.primary_table, &link.primary_column),
            (&link.foreign_table, &link.foreign_column),
        ] {
            let view = views
                .iter()
                .find(|v| &v.table == table)
                .ok_or_else(|| AppError::BadRequest(format!("relation endpoint '{}' is not part of the request", table)))?;
            if !view.schema.has_column(column) {
                return Err(AppError::BadRequest(format!("relation column '{}.{}' does not exist", table, column)));
            }
        }
        Ok(link)
    }

    fn apply(&self, view: &mut ResourceView, p: &QueryParam) -> Result<(), AppError> {
        match p.key.as_str() {
            "distinct" => view.distinct = truthy(&p.value),
            "filter" | "where" => view.add_filter(&self.compiler, &p.value)?,
            "columns" => view.add_columns(&p.value),
            "exclude" => view.add_exclude(&p.value),
            "order" => view.add_order(&p.value),
            "page" => view.set_page(&p.value, self.settings.page_size),
            "start" => view.set_start(&p.value),
            "length" => view.set_length(&p.value),
            "join" => view.add_join(&self.compiler, &p.value)?,
            "group" => view.add_group(&p.value),
            "having" => view.set_having(&self.compiler, &p.value)?,
            _ => {}
        }
        Ok(())
    }
}
