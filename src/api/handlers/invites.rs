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
use crate::autojoin::AutojoinSettings;
use crate::engine::Engine;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub link: String,
    pub source_dialog_id: Option<i32>,
    pub source_user_id: Option<i32>,
}

pub async fn create_invite(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateInviteRequest>,
) -> impl IntoResponse {
    match engine
        .autojoin
        .create(&req.link, req.source_dialog_id, req.source_user_id)
        .await
    {
        Ok(invite) => success(invite),
        Err(e) => error(&e),
    }
}

pub async fn list_invites(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::invites::list(&mut conn).await {
        Ok(invites) => success(invites),
        Err(e) => persistence_error(e),
    }
}

pub async fn delete_invite(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::invites::delete(&mut conn, id).await {
        Ok(0) => error(&crate::error::EngineError::NotFound(format!("invite {}", id))),
        Ok(_) => success(json!({"deleted": id})),
        Err(e) => persistence_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub account_id: Option<i32>,
}

pub async fn resolve_invite(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
    body: Option<Json<ResolveRequest>>,
) -> impl IntoResponse {
    let account_id = body.and_then(|Json(req)| req.account_id);
    match engine.autojoin.resolve(id, account_id).await {
        Ok(invite) => success(invite),
        Err(e) => error(&e),
    }
}

pub async fn join_now(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match engine.autojoin.join_now(id).await {
        Ok(invite) => success(invite),
        Err(e) => error(&e),
    }
}

pub async fn autojoin_config_get(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    match engine.autojoin.settings().await {
        Ok(settings) => success(settings),
        Err(e) => error(&e),
    }
}

pub async fn autojoin_config_set(
    State(engine): State<Arc<Engine>>,
    Json(settings): Json<AutojoinSettings>,
) -> impl IntoResponse {
    match engine.autojoin.update_settings(&settings).await {
        Ok(()) => success(settings),
        Err(e) => error(&e),
    }
}
