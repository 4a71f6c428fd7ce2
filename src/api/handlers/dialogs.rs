// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::routes::{error, success};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::dialog::DialogOptions;

/// Upstream dialogs visible to a connected account.
pub async fn list_available(
    State(engine): State<Arc<Engine>>,
    Path(account_id): Path<i32>,
) -> impl IntoResponse {
    let handle = match engine.manager.require_session(account_id).await {
        Ok(handle) => handle,
        Err(e) => return error(&e),
    };
    match handle.list_dialogs().await {
        Ok(dialogs) => success(
            dialogs
                .iter()
                .map(|d| {
                    json!({
                        "telegram_id": d.id,
                        "type": d.kind,
                        "title": d.title,
                        "username": d.username,
                        "member_count": d.member_count,
                    })
                })
                .collect::<Vec<_>>(),
        ),
        Err(e) => error(&e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddDialogsRequest {
    pub telegram_ids: Vec<i64>,
    #[serde(default = "default_true")]
    pub download_media: bool,
    #[serde(default = "default_true")]
    pub backfill_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Put a subset of the account's upstream dialogs under management.
pub async fn add_dialogs(
    State(engine): State<Arc<Engine>>,
    Path(account_id): Path<i32>,
    Json(req): Json<AddDialogsRequest>,
) -> impl IntoResponse {
    let handle = match engine.manager.require_session(account_id).await {
        Ok(handle) => handle,
        Err(e) => return error(&e),
    };
    let available = match handle.list_dialogs().await {
        Ok(dialogs) => dialogs,
        Err(e) => return error(&e.into()),
    };
    let selected: Vec<_> = available
        .into_iter()
        .filter(|d| req.telegram_ids.contains(&d.id))
        .collect();
    if selected.is_empty() {
        return error(&EngineError::NotFound(
            "none of the requested dialogs are visible to this account".into(),
        ));
    }
    match engine
        .registry
        .add_dialogs(account_id, &selected, req.download_media, req.backfill_enabled)
        .await
    {
        Ok(added) => success(added),
        Err(e) => error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub account_id: Option<i32>,
}

pub async fn list_managed(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match engine.registry.list(query.account_id).await {
        Ok(dialogs) => success(dialogs),
        Err(e) => error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub account_id: i32,
    #[serde(default)]
    pub reassign: bool,
}

pub async fn assign(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
    Json(req): Json<AssignRequest>,
) -> impl IntoResponse {
    match engine
        .registry
        .assign(dialog_id, req.account_id, req.reassign)
        .await
    {
        Ok(()) => success(json!({"dialog_id": dialog_id, "account_id": req.account_id})),
        Err(e) => error(&e),
    }
}

pub async fn toggle_monitoring(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
) -> impl IntoResponse {
    match engine.registry.toggle_monitoring(dialog_id).await {
        Ok(monitoring) => success(json!({"dialog_id": dialog_id, "is_monitoring": monitoring})),
        Err(e) => error(&e),
    }
}

pub async fn set_options(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
    Json(options): Json<DialogOptions>,
) -> impl IntoResponse {
    match engine.registry.set_options(dialog_id, &options).await {
        Ok(dialog) => success(dialog),
        Err(e) => error(&e),
    }
}

pub async fn pause(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
) -> impl IntoResponse {
    match engine.registry.pause(dialog_id).await {
        Ok(()) => success(json!({"dialog_id": dialog_id, "status": "paused"})),
        Err(e) => error(&e),
    }
}

pub async fn resume(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
) -> impl IntoResponse {
    match engine.registry.resume(dialog_id).await {
        Ok(()) => success(json!({"dialog_id": dialog_id, "status": "active"})),
        Err(e) => error(&e),
    }
}

pub async fn start_backfill(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
) -> impl IntoResponse {
    match engine.backfill.clone().start(dialog_id).await {
        Ok(()) => success(json!({"dialog_id": dialog_id, "backfill": "started"})),
        Err(e) => error(&e),
    }
}

pub async fn stop_backfill(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
) -> impl IntoResponse {
    let stopped = engine.backfill.stop(dialog_id).await;
    success(json!({"dialog_id": dialog_id, "stopping": stopped}))
}
