// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::engine::Engine;

/// Health check endpoint
pub async fn health_check(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    // Check database connection
    match engine.db.get_connection().await {
        Ok(_) => {
            let sessions = engine.manager.status_snapshot().await;
            (
                StatusCode::OK,
                Json(json!({
                    "status": "healthy",
                    "sessions": sessions
                        .iter()
                        .map(|(id, status, dropped)| json!({
                            "account_id": id,
                            "status": status,
                            "dropped_events": dropped,
                        }))
                        .collect::<Vec<_>>(),
                })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "message": format!("Database connection failed: {}", e)
            })),
        ),
    }
}
