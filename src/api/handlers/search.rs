// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::routes::{error, persistence_error, success};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::store::search::SearchParams;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    /// Comma-separated subset of messages,users,detections.
    pub types: Option<String>,
    pub dialog_id: Option<i32>,
    pub detection_type: Option<String>,
    pub limit: Option<i64>,
}

pub async fn search(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    if query.q.trim().is_empty() {
        return error(&EngineError::InvalidRequest("empty query".into()));
    }
    let params = SearchParams {
        q: query.q,
        types: query
            .types
            .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
        dialog_id: query.dialog_id,
        detection_type: query.detection_type,
        limit: query.limit,
    };

    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match crate::store::search::search(
        &mut conn,
        engine.config.fts_regconfig(),
        &engine.config.search,
        &params,
    )
    .await
    {
        Ok(results) => success(results),
        Err(e) => persistence_error(e),
    }
}
