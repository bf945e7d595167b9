//! In-memory database → table → column metadata, read-only once built.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub nullable: bool,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            data_type: data_type.into(),
            max_length: None,
            default_value: None,
            extra: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub comment: String,
    pub primary_key: Option<String>,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: Option<&str>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            primary_key: primary_key.map(String::from),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

pub type DatabaseSchema = BTreeMap<String, Arc<TableSchema>>;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct SchemaCatalog {
    databases: BTreeMap<String, DatabaseSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database even when it has no tables yet.
    pub fn add_database(&mut self, database: &str) {
        self.databases.entry(database.to_string()).or_default();
    }

    pub fn insert_table(&mut self, database: &str, table: TableSchema) {
        self.databases
            .entry(database.to_string())
            .or_default()
            .insert(table.name.clone(), Arc::new(table));
    }

    pub fn is_database(&self, database: &str) -> bool {
        self.databases.contains_key(database)
    }

    pub fn table(&self, database: &str, table: &str) -> Option<&Arc<TableSchema>> {
        self.databases.get(database).and_then(|d| d.get(table))
    }

    pub fn is_table(&self, database: &str, table: &str) -> bool {
        self.table(database, table).is_some()
    }

    pub fn tables(&self, database: &str) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.databases.get(database).into_iter().flat_map(|d| d.values())
    }

    pub fn table_count(&self) -> usize {
        self.databases.values().map(|d| d.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        let mut c = SchemaCatalog::new();
        c.insert_table(
            "public",
            TableSchema::new(
                "users",
                Some("id"),
                vec![ColumnSchema::new("id", "integer"), ColumnSchema::new("name", "text")],
            ),
        );
        c.add_database("audit");
        c
    }

    #[test]
    fn lookups() {
        let c = catalog();
        assert!(c.is_database("audit"));
        assert!(c.is_table("public", "users"));
        assert!(!c.is_table("audit", "users"));
        let users = c.table("public", "users").unwrap();
        assert_eq!(users.primary_key.as_deref(), Some("id"));
        assert!(users.has_column("name"));
        assert_eq!(c.table_count(), 1);
    }

    #[test]
    fn serializes_as_nested_maps() {
        let v = serde_json::to_value(catalog()).unwrap();
        assert_eq!(v["public"]["users"]["primary_key"], "id");
        assert!(v["audit"].as_object().unwrap().is_empty());
    }
}
