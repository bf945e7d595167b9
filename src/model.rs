//! Named models: custom handlers addressed by the first path segment.

use crate::error::AppError;
use crate::request::query::QueryParam;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Function used when the second path segment names none of the model's functions.
pub const DEFAULT_FUNCTION: &str = "index";

#[derive(Clone, Debug)]
pub struct ModelCall {
    pub model: String,
    pub function: String,
    pub method: String,
    /// Path segments after the function.
    pub args: Vec<String>,
    pub query: Vec<QueryParam>,
    pub body: Option<Value>,
}

#[async_trait]
pub trait Model: Send + Sync {
    /// Callable function names, matched case-insensitively.
    fn functions(&self) -> &[&'static str];

    async fn call(&self, call: ModelCall) -> Result<Value, AppError>;

    fn has_function(&self, name: &str) -> bool {
        self.functions().iter().any(|f| f.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Model>> {
        self.models.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Split the path after the model name into function and args.
pub fn resolve_call(model_name: &str, model: &dyn Model, rest: &[String]) -> (String, Vec<String>) {
    match rest.split_first() {
        Some((first, args)) if model.has_function(first) => (first.to_lowercase(), args.to_vec()),
        _ => {
            tracing::debug!(model = %model_name, "dispatching to default function");
            (DEFAULT_FUNCTION.to_string(), rest.to_vec())
        }
    }
}
