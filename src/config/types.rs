//! Engine settings: dialect, databases, paging and write policy.

use crate::schema::Dialect;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const DEFAULT_INSERT_CHUNK: usize = 30;
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// HTTP verbs understood by the engine.
pub const KNOWN_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiSettings {
    pub dialect: Dialect,
    pub main_db: String,
    /// Secondary databases addressable as the first path segment.
    #[serde(default)]
    pub databases: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
    #[serde(default = "default_insert_chunk")]
    pub insert_chunk_size: usize,
    #[serde(default)]
    pub catalog_ttl_secs: Option<u64>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    #[serde(default, skip_serializing)]
    pub database_url: Option<String>,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_allowed_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_insert_chunk() -> usize {
    DEFAULT_INSERT_CHUNK
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT
}

impl ApiSettings {
    pub fn new(dialect: Dialect, main_db: impl Into<String>) -> Self {
        let main_db = main_db.into();
        Self {
            dialect,
            databases: vec![main_db.clone()],
            main_db,
            page_size: DEFAULT_PAGE_SIZE,
            allowed_methods: default_allowed_methods(),
            insert_chunk_size: DEFAULT_INSERT_CHUNK,
            catalog_ttl_secs: None,
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            database_url: None,
        }
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_methods = methods.into_iter().map(|m| m.as_ref().to_uppercase()).collect();
        self
    }

    /// GET, HEAD and OPTIONS are always served; other verbs must be listed.
    pub fn allows(&self, method: &str) -> bool {
        matches!(method, "GET" | "HEAD" | "OPTIONS")
            || self.allowed_methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Ensure `main_db` heads the database list and method names are upper-case.
    pub fn normalize(&mut self) {
        self.databases.retain(|d| !d.trim().is_empty());
        if !self.databases.iter().any(|d| d == &self.main_db) {
            self.databases.insert(0, self.main_db.clone());
        }
        for m in &mut self.allowed_methods {
            *m = m.trim().to_uppercase();
        }
    }

    pub fn is_secondary_database(&self, name: &str) -> bool {
        name != self.main_db && self.databases.iter().any(|d| d == name)
    }
}
