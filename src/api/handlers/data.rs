// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Read-side endpoints over the captured corpus.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::api::routes::{error, persistence_error, success};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
}

pub async fn dialog_messages(
    State(engine): State<Arc<Engine>>,
    Path(dialog_id): Path<i32>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::dialogs::get(&mut conn, dialog_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error(&EngineError::NotFound(format!("dialog {}", dialog_id))),
        Err(e) => return persistence_error(e),
    }
    let total = match store::messages::count_for_dialog(&mut conn, dialog_id).await {
        Ok(total) => total,
        Err(e) => return persistence_error(e),
    };
    match store::messages::recent_for_dialog(&mut conn, dialog_id, limit).await {
        Ok(messages) => success(json!({
            "total": total,
            "messages": messages,
        })),
        Err(e) => persistence_error(e),
    }
}

pub async fn user_photos(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::profile_photos::for_user(&mut conn, user_id).await {
        Ok(photos) => success(photos),
        Err(e) => persistence_error(e),
    }
}

pub async fn user_stories(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::stories::for_user(&mut conn, user_id).await {
        Ok(stories) => success(stories),
        Err(e) => persistence_error(e),
    }
}

/// The append-only identity mutation log of a user.
pub async fn user_identity_history(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::users::get(&mut conn, user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error(&EngineError::NotFound(format!("user {}", user_id))),
        Err(e) => return persistence_error(e),
    }
    match store::users::identity_history(&mut conn, user_id).await {
        Ok(history) => success(history),
        Err(e) => persistence_error(e),
    }
}

/// Refresh a user's profile from upstream immediately, logging identity
/// changes on the way.
pub async fn enrich_user(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<i32>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    let user = match store::users::get(&mut conn, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return error(&EngineError::NotFound(format!("user {}", user_id))),
        Err(e) => return persistence_error(e),
    };

    let handle = match engine.manager.any_session().await {
        Some(handle) => handle,
        None => return error(&EngineError::InvalidRequest("no connected account".into())),
    };
    let upstream = match handle.get_entity(user.telegram_id).await {
        Ok(upstream) => upstream,
        Err(e) => return error(&e.into()),
    };

    let row = crate::ingest::user_row(&upstream);
    if let Err(e) = store::users::upsert_full(&mut conn, &row).await {
        return persistence_error(e);
    }
    match store::users::get(&mut conn, user_id).await {
        Ok(Some(updated)) => success(updated),
        Ok(None) => error(&EngineError::NotFound(format!("user {}", user_id))),
        Err(e) => persistence_error(e),
    }
}

/// Detection counts over the builtin taxonomy.
pub async fn detection_stats(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    let mut counts = serde_json::Map::new();
    for detection_type in [
        "email",
        "phone",
        "crypto",
        "url",
        "invite_link",
        "telegram_link",
        "telegram_username",
    ] {
        match store::detections::count_by_type(&mut conn, detection_type).await {
            Ok(count) => {
                counts.insert(detection_type.to_string(), json!(count));
            }
            Err(e) => return persistence_error(e),
        }
    }
    success(serde_json::Value::Object(counts))
}
