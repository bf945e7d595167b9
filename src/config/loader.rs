//! Load settings from `RESTAPI_*` environment variables or a JSON file.

use crate::config::{validate_settings, ApiSettings};
use crate::error::ConfigError;
use crate::schema::Dialect;
use std::path::Path;

const ENV_PREFIX: &str = "RESTAPI_";

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>()
        .map_err(|_| ConfigError::Load(format!("{}{} must be a number, got '{}'", ENV_PREFIX, name, raw)))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl ApiSettings {
    /// Read settings from the process environment (after loading `.env`).
    ///
    /// `RESTAPI_DIALECT` and `RESTAPI_MAIN_DB` are required; `RESTAPI_DATABASES` and
    /// `RESTAPI_ALLOWED_METHODS` are comma lists. `DATABASE_URL` is accepted as a fallback
    /// for `RESTAPI_DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let dialect: Dialect = env_var("DIALECT")
            .ok_or_else(|| ConfigError::Load(format!("{}DIALECT is not set", ENV_PREFIX)))?
            .parse()?;
        let main_db = env_var("MAIN_DB")
            .ok_or_else(|| ConfigError::Load(format!("{}MAIN_DB is not set", ENV_PREFIX)))?;

        let mut settings = ApiSettings::new(dialect, main_db);
        if let Some(raw) = env_var("DATABASES") {
            settings.databases = split_list(&raw);
        }
        if let Some(raw) = env_var("PAGE_SIZE") {
            settings.page_size = parse_number("PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = env_var("ALLOWED_METHODS") {
            settings.allowed_methods = split_list(&raw);
        }
        if let Some(raw) = env_var("INSERT_CHUNK_SIZE") {
            settings.insert_chunk_size = parse_number("INSERT_CHUNK_SIZE", &raw)?;
        }
        if let Some(raw) = env_var("CATALOG_TTL_SECS") {
            settings.catalog_ttl_secs = Some(parse_number("CATALOG_TTL_SECS", &raw)?);
        }
        if let Some(raw) = env_var("BODY_LIMIT_BYTES") {
            settings.body_limit_bytes = parse_number("BODY_LIMIT_BYTES", &raw)?;
        }
        settings.database_url = env_var("DATABASE_URL").or_else(|| {
            std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty())
        });

        settings.normalize();
        validate_settings(&settings)?;
        Ok(settings)
    }

    /// Read settings from a JSON document.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut settings: ApiSettings =
            serde_json::from_str(raw).map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.normalize();
        validate_settings(&settings)?;
        Ok(settings)
    }
}
