//! Catch-all handler feeding every method and path to the engine.

use crate::error::AppError;
use crate::response::render;
use crate::schema::SchemaCatalog;
use crate::service::Command;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    response::Response,
    Json,
};
use serde_json::Value;

fn parse_body(raw: &[u8]) -> Result<Option<Value>, AppError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(raw)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let body = parse_body(&body)?;
    let output = state
        .engine
        .handle(method.as_str(), uri.path(), uri.query().unwrap_or(""), body)
        .await?;
    Ok(render(Command::parse(method.as_str()), output))
}

/// Raw catalog as JSON.
pub async fn schema(State(state): State<AppState>) -> Json<SchemaCatalog> {
    Json(state.engine.catalog().as_ref().clone())
}
