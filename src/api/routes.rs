use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::EngineError;

/// Shape of every command result: `{success, data}` or
/// `{success, error: {kind, message}}`.
pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": data,
        })),
    )
}

pub fn error(e: &EngineError) -> (StatusCode, Json<Value>) {
    let status = match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        EngineError::PermissionDenied(_) | EngineError::SessionBanned => StatusCode::FORBIDDEN,
        EngineError::AuthRequired | EngineError::Invalid2fa => StatusCode::UNAUTHORIZED,
        EngineError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "success": false,
            "error": {
                "kind": e.kind(),
                "message": e.to_string(),
            },
        })),
    )
}

pub fn persistence_error(e: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    error(&EngineError::Persistence(e.to_string()))
}
