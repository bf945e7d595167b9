//! Settings validation.

use crate::config::{ApiSettings, KNOWN_METHODS};
use crate::error::ConfigError;

pub fn validate_settings(settings: &ApiSettings) -> Result<(), ConfigError> {
    if settings.main_db.trim().is_empty() {
        return Err(ConfigError::Validation("main_db must not be empty".into()));
    }
    if settings.page_size == 0 {
        return Err(ConfigError::Validation("page_size must be greater than zero".into()));
    }
    if settings.insert_chunk_size == 0 {
        return Err(ConfigError::Validation("insert_chunk_size must be greater than zero".into()));
    }
    if settings.catalog_ttl_secs == Some(0) {
        return Err(ConfigError::Validation("catalog_ttl_secs must be greater than zero".into()));
    }
    for m in &settings.allowed_methods {
        if !KNOWN_METHODS.iter().any(|k| k.eq_ignore_ascii_case(m)) {
            return Err(ConfigError::Validation(format!("unknown method '{}' in allowed_methods", m)));
        }
    }
    Ok(())
}
