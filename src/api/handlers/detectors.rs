// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::routes::{error, persistence_error, success};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::extract::Extractor;
use crate::models::detection::NewDetector;
use crate::store;

pub async fn list_detectors(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::detections::list_detectors(&mut conn).await {
        Ok(detectors) => success(detectors),
        Err(e) => persistence_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDetectorRequest {
    pub name: String,
    pub pattern: String,
    pub category: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

pub async fn create_detector(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateDetectorRequest>,
) -> impl IntoResponse {
    // Reject patterns that would never compile instead of letting the
    // extractor skip them silently later.
    if !Extractor::validate_pattern(&req.pattern) {
        return error(&EngineError::ValidationFailed(format!(
            "pattern does not compile: {}",
            req.pattern
        )));
    }

    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    let detector = NewDetector {
        name: req.name,
        pattern: req.pattern,
        category: req.category,
        description: req.description,
        priority: req.priority,
        is_builtin: false,
        is_active: true,
    };
    match store::detections::create_detector(&mut conn, &detector).await {
        Ok(created) => success(created),
        Err(e) => persistence_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn set_detector_active(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
    Json(req): Json<SetActiveRequest>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::detections::set_detector_active(&mut conn, id, req.is_active).await {
        Ok(0) => error(&EngineError::NotFound(format!("detector {}", id))),
        Ok(_) => success(json!({"id": id, "is_active": req.is_active})),
        Err(e) => persistence_error(e),
    }
}
