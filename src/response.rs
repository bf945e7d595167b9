//! Status and body for engine output.

use crate::service::{ApiOutput, Command};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

pub fn success_ok(data: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(data))
}

pub fn success_created(data: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(data))
}

/// POST answers 201, HEAD an empty 200, everything else 200 with the JSON map.
pub fn render(command: Option<Command>, output: ApiOutput) -> Response {
    match (command, output) {
        (_, ApiOutput::Empty) => StatusCode::OK.into_response(),
        (Some(Command::Post), ApiOutput::Json(data)) => success_created(data).into_response(),
        (_, ApiOutput::Json(data)) => success_ok(data).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_is_created() {
        let res = render(Some(Command::Post), ApiOutput::Json(json!({"users": 1})));
        assert_eq!(res.status(), StatusCode::CREATED);
        let res = render(Some(Command::Get), ApiOutput::Json(json!({"users": []})));
        assert_eq!(res.status(), StatusCode::OK);
        let res = render(Some(Command::Head), ApiOutput::Empty);
        assert_eq!(res.status(), StatusCode::OK);
    }
}
