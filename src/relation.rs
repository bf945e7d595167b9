//! Parent/child links between views: write and delete ordering, and nesting of GET results.

use crate::error::AppError;
use crate::request::query::sanitize;
use crate::request::{ResourceView, ViewRole};
use crate::sql::Row;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};

/// `parent.column` is referenced by `child.column`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelationLink {
    pub primary_table: String,
    pub primary_column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

fn endpoint(raw: &str) -> Option<(String, String)> {
    let (table, column) = raw.trim().rsplit_once('.')?;
    let table = sanitize(table, "-");
    let column = sanitize(column, "-");
    (!table.is_empty() && !column.is_empty()).then_some((table, column))
}

impl RelationLink {
    /// Parse `parent.col,child.col`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let invalid = || AppError::BadRequest(format!("relation '{}' must look like parent.column,child.column", raw));
        let (left, right) = raw.split_once(',').ok_or_else(invalid)?;
        let (primary_table, primary_column) = endpoint(left).ok_or_else(invalid)?;
        let (foreign_table, foreign_column) = endpoint(right).ok_or_else(invalid)?;
        Ok(Self {
            primary_table,
            primary_column,
            foreign_table,
            foreign_column,
        })
    }

    pub fn touches(&self, table: &str) -> bool {
        self.primary_table == table || self.foreign_table == table
    }
}

/// View indices ordered so every referenced (parent) table precedes the tables referencing it.
/// Ties keep first-reference order; tables caught in a cycle follow in first-reference order.
pub fn write_order(views: &[ResourceView], links: &[RelationLink]) -> Vec<usize> {
    let index: HashMap<&str, usize> = views.iter().enumerate().map(|(i, v)| (v.table.as_str(), i)).collect();
    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for link in links {
        if let (Some(&parent), Some(&child)) = (
            index.get(link.primary_table.as_str()),
            index.get(link.foreign_table.as_str()),
        ) {
            if parent != child {
                edges.insert((parent, child));
            }
        }
    }
    let mut pending = vec![0usize; views.len()];
    for &(_, child) in &edges {
        pending[child] += 1;
    }
    let mut ready: BTreeSet<usize> = (0..views.len()).filter(|i| pending[*i] == 0).collect();
    let mut order = Vec::with_capacity(views.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &(parent, child) in &edges {
            if parent == next {
                pending[child] -= 1;
                if pending[child] == 0 {
                    ready.insert(child);
                }
            }
        }
    }
    if order.len() < views.len() {
        tracing::warn!("relation cycle detected; remaining tables keep request order");
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..views.len()).filter(|i| !placed.contains(i)));
    }
    order
}

/// Children before parents.
pub fn delete_order(views: &[ResourceView], links: &[RelationLink]) -> Vec<usize> {
    let mut order = write_order(views, links);
    order.reverse();
    order
}

/// Join key as text so `1` and `"1"` meet in the same bucket.
pub(crate) fn join_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One nesting step: rows of `source` are copied into rows of `target`.
struct Attach<'a> {
    link: &'a RelationLink,
    parent: usize,
    child: usize,
    /// The child is the primary view and receives its single parent object.
    into_child: bool,
}

impl Attach<'_> {
    fn source(&self) -> usize {
        if self.into_child {
            self.parent
        } else {
            self.child
        }
    }

    fn target(&self) -> usize {
        if self.into_child {
            self.child
        } else {
            self.parent
        }
    }
}

/// Steps ordered so a view is copied only after everything nested into it has been attached.
fn attach_order<'a>(views: &[ResourceView], links: &'a [RelationLink]) -> Vec<Attach<'a>> {
    let index: HashMap<&str, usize> = views.iter().enumerate().map(|(i, v)| (v.table.as_str(), i)).collect();
    let mut pending: Vec<Attach<'a>> = links
        .iter()
        .filter_map(|link| {
            let parent = *index.get(link.primary_table.as_str())?;
            let child = *index.get(link.foreign_table.as_str())?;
            (parent != child).then(|| Attach {
                link,
                parent,
                child,
                into_child: views[child].role == ViewRole::Primary,
            })
        })
        .collect();
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready = (0..pending.len()).find(|&i| {
            let source = pending[i].source();
            pending.iter().enumerate().all(|(j, other)| j == i || other.target() != source)
        });
        let next = ready.unwrap_or_else(|| {
            tracing::warn!("relation cycle detected; nesting the remaining links in request order");
            0
        });
        ordered.push(pending.remove(next));
    }
    ordered
}

/// Nest related rows and return `{table: rows}` for the views left at the top level.
///
/// The primary view hosts its links. When the primary is the parent, each parent row gets a list
/// of its children with the foreign-key column stripped. When the primary is the child, each row
/// gets its single parent object and loses the foreign-key column. Links between two non-primary
/// views nest the child list under the parent. Deeper levels are attached first, so a view is
/// complete by the time it is copied into the level above.
pub fn merge_results(views: &[ResourceView], links: &[RelationLink], mut results: Vec<Vec<Row>>) -> Map<String, Value> {
    let mut nested: HashSet<usize> = HashSet::new();

    for step in attach_order(views, links) {
        let (link, parent, child) = (step.link, step.parent, step.child);
        if nested.contains(&step.target()) {
            tracing::warn!(table = %views[step.target()].table, "relation skipped: rows already nested elsewhere");
            continue;
        }
        if step.into_child {
            let mut parents: HashMap<String, Row> = HashMap::new();
            for row in &results[parent] {
                if let Some(key) = row.get(&link.primary_column).and_then(join_key) {
                    parents.entry(key).or_insert_with(|| row.clone());
                }
            }
            for row in &mut results[child] {
                let Some(key) = row.get(&link.foreign_column).and_then(join_key) else {
                    continue;
                };
                if let Some(found) = parents.get(&key) {
                    row.remove(&link.foreign_column);
                    row.insert(link.primary_table.clone(), Value::Object(found.clone()));
                }
            }
        } else {
            let mut children: HashMap<String, Vec<Value>> = HashMap::new();
            for row in &results[child] {
                if let Some(key) = row.get(&link.foreign_column).and_then(join_key) {
                    let mut stripped = row.clone();
                    stripped.remove(&link.foreign_column);
                    children.entry(key).or_default().push(Value::Object(stripped));
                }
            }
            for row in &mut results[parent] {
                let Some(key) = row.get(&link.primary_column).and_then(join_key) else {
                    continue;
                };
                if let Some(list) = children.get(&key) {
                    row.insert(link.foreign_table.clone(), Value::Array(list.clone()));
                }
            }
        }
        nested.insert(step.source());
    }

    let mut out = Map::new();
    for (i, rows) in results.into_iter().enumerate() {
        if nested.contains(&i) {
            continue;
        }
        out.insert(views[i].table.clone(), Value::Array(rows.into_iter().map(Value::Object).collect()));
    }
    out
}
