//! `RestEngine`: the single `handle(method, path, query, body)` entry point.

use crate::config::ApiSettings;
use crate::error::{AppError, ConfigError};
use crate::model::ModelRegistry;
use crate::request::{ParsedRequest, RequestParser};
use crate::schema::{build_catalog, IntrospectionProvider, SchemaCatalog};
use crate::service::command::{assign_payloads, CommandExecutor};
use crate::service::options;
use crate::sql::SqlExecutor;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Command {
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(Command::Get),
            "POST" => Some(Command::Post),
            "PUT" => Some(Command::Put),
            "PATCH" => Some(Command::Patch),
            "DELETE" => Some(Command::Delete),
            "HEAD" => Some(Command::Head),
            "OPTIONS" => Some(Command::Options),
            _ => None,
        }
    }

    /// Writes only honour `filter`, `where` and `relation` in the query string.
    pub fn is_write(self) -> bool {
        matches!(self, Command::Post | Command::Put | Command::Patch | Command::Delete)
    }

    pub fn needs_body(self) -> bool {
        matches!(self, Command::Post | Command::Put | Command::Patch)
    }
}

#[derive(Debug, PartialEq)]
pub enum ApiOutput {
    Json(Value),
    /// HEAD: success without a body.
    Empty,
}

pub struct RestEngine {
    executor: Arc<dyn SqlExecutor>,
    /// Swapped whole on refresh; requests keep the snapshot they started with.
    catalog: RwLock<Arc<SchemaCatalog>>,
    settings: Arc<ApiSettings>,
    models: ModelRegistry,
    commands: CommandExecutor,
}

impl RestEngine {
    pub fn new(executor: Arc<dyn SqlExecutor>, settings: ApiSettings, catalog: SchemaCatalog) -> Self {
        let commands = CommandExecutor::new(Arc::clone(&executor), settings.insert_chunk_size);
        Self {
            executor,
            catalog: RwLock::new(Arc::new(catalog)),
            settings: Arc::new(settings),
            models: ModelRegistry::new(),
            commands,
        }
    }

    /// Introspect every configured database and build an engine over the result.
    pub async fn bootstrap(executor: Arc<dyn SqlExecutor>, settings: ApiSettings) -> Result<Self, AppError> {
        if executor.dialect() != settings.dialect {
            return Err(ConfigError::Validation(format!(
                "executor dialect '{}' does not match configured dialect '{}'",
                executor.dialect().name(),
                settings.dialect.name()
            ))
            .into());
        }
        let provider = IntrospectionProvider::new(Arc::clone(&executor));
        let catalog = build_catalog(&provider, &settings.databases).await?;
        Ok(Self::new(executor, settings, catalog))
    }

    pub fn with_models(mut self, models: ModelRegistry) -> Self {
        self.models = models;
        self
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    pub fn executor(&self) -> &Arc<dyn SqlExecutor> {
        &self.executor
    }

    pub fn catalog(&self) -> Arc<SchemaCatalog> {
        let guard = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub async fn refresh_catalog(&self) -> Result<(), AppError> {
        let provider = IntrospectionProvider::new(Arc::clone(&self.executor));
        let fresh = build_catalog(&provider, &self.settings.databases).await?;
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(fresh);
        Ok(())
    }

    /// Rebuild the catalog every `catalog_ttl_secs`. Stops once the engine is dropped.
    pub fn spawn_catalog_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let secs = self.settings.catalog_ttl_secs.filter(|s| *s > 0)?;
        let weak = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                match engine.refresh_catalog().await {
                    Ok(()) => tracing::info!(tables = engine.catalog().table_count(), "schema catalog refreshed"),
                    Err(e) => tracing::warn!(error = %e, "schema catalog refresh failed; keeping previous catalog"),
                }
            }
        }))
    }

    pub async fn handle(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: Option<Value>,
    ) -> Result<ApiOutput, AppError> {
        let method = method.to_uppercase();
        let command = Command::parse(&method)
            .filter(|_| self.settings.allows(&method))
            .ok_or_else(|| AppError::NotFound(format!("method '{}'", method)))?;
        tracing::info!(method = %method, path = %path, "dispatching request");

        let catalog = self.catalog();
        if command == Command::Options {
            return Ok(ApiOutput::Json(options::describe(&self.settings, &catalog)));
        }

        let parsed = RequestParser::new(&catalog, &self.settings, &self.models).parse(
            &method,
            path,
            query,
            command.is_write(),
        )?;
        let mut parsed = match parsed {
            ParsedRequest::Model(mut call) => {
                let model = self
                    .models
                    .get(&call.model)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("model '{}'", call.model)))?;
                call.body = body;
                return model.call(call).await.map(ApiOutput::Json);
            }
            ParsedRequest::Views(views) => views,
        };

        let body = match (command.needs_body(), body) {
            (true, Some(Value::Null)) | (true, None) => {
                return Err(AppError::BadRequest("request body is required".into()));
            }
            (_, body) => body.unwrap_or(Value::Null),
        };

        match command {
            Command::Get => self.commands.get(&parsed).await.map(ApiOutput::Json),
            Command::Post => {
                assign_payloads(&mut parsed, body)?;
                self.commands.post(&parsed).await.map(ApiOutput::Json)
            }
            Command::Patch => self.commands.patch(&parsed, body).await.map(ApiOutput::Json),
            Command::Put => self.commands.put(&parsed, body).await.map(ApiOutput::Json),
            Command::Delete => self.commands.delete(&parsed).await.map(ApiOutput::Json),
            Command::Head | Command::Options => Ok(ApiOutput::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("get"), Some(Command::Get));
        assert_eq!(Command::parse("OPTIONS"), Some(Command::Options));
        assert_eq!(Command::parse("TRACE"), None);
        assert!(Command::Delete.is_write());
        assert!(!Command::Delete.needs_body());
        assert!(!Command::Head.is_write());
    }
}
