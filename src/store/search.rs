// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Full-text search over messages, users and detections.
//!
//! Queries go through the language-tagged FTS index first; when that yields
//! nothing (or errors) and the fallback is enabled, a case-insensitive
//! substring match runs instead.

use diesel::sql_types::{BigInt, Integer, Nullable, Text, Timestamp};
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SearchConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub q: String,
    /// Subset of {messages, users, detections}; empty means all.
    #[serde(default)]
    pub types: Vec<String>,
    pub dialog_id: Option<i32>,
    pub detection_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, diesel::QueryableByName)]
pub struct MessageHit {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Integer)]
    pub dialog_id: i32,
    #[diesel(sql_type = BigInt)]
    pub telegram_message_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub text: Option<String>,
    #[diesel(sql_type = Timestamp)]
    pub date: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize, diesel::QueryableByName)]
pub struct UserHit {
    #[diesel(sql_type = Integer)]
    pub id: i32,
    #[diesel(sql_type = BigInt)]
    pub telegram_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub username: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub first_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, diesel::QueryableByName)]
pub struct DetectionHit {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = BigInt)]
    pub message_id: i64,
    #[diesel(sql_type = Text)]
    pub detection_type: String,
    #[diesel(sql_type = Text)]
    pub matched_text: String,
    #[diesel(sql_type = Text)]
    pub normalized_value: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub messages: Vec<MessageHit>,
    pub users: Vec<UserHit>,
    pub detections: Vec<DetectionHit>,
}

fn wants(params: &SearchParams, kind: &str) -> bool {
    params.types.is_empty() || params.types.iter().any(|t| t == kind)
}

fn limit(params: &SearchParams) -> i64 {
    params.limit.unwrap_or(50).clamp(1, 500)
}

async fn messages_fts(
    conn: &mut AsyncPgConnection,
    regconfig: &str,
    params: &SearchParams,
) -> QueryResult<Vec<MessageHit>> {
    let dialog_filter = match params.dialog_id {
        Some(_) => "AND dialog_id = $3",
        None => "",
    };
    let sql = format!(
        "SELECT id, dialog_id, telegram_message_id, text, date FROM messages \
         WHERE to_tsvector('{lang}', coalesce(text, '')) @@ websearch_to_tsquery('{lang}', $1) \
         {dialog_filter} ORDER BY date DESC LIMIT $2",
        lang = regconfig,
        dialog_filter = dialog_filter,
    );
    let query = diesel::sql_query(sql)
        .bind::<Text, _>(&params.q)
        .bind::<BigInt, _>(limit(params));
    match params.dialog_id {
        Some(dialog_id) => query.bind::<Integer, _>(dialog_id).load(conn).await,
        None => query.load(conn).await,
    }
}

async fn messages_substring(
    conn: &mut AsyncPgConnection,
    params: &SearchParams,
) -> QueryResult<Vec<MessageHit>> {
    let dialog_filter = match params.dialog_id {
        Some(_) => "AND dialog_id = $3",
        None => "",
    };
    let sql = format!(
        "SELECT id, dialog_id, telegram_message_id, text, date FROM messages \
         WHERE text ILIKE $1 {dialog_filter} ORDER BY date DESC LIMIT $2",
        dialog_filter = dialog_filter,
    );
    let pattern = format!("%{}%", params.q);
    let query = diesel::sql_query(sql)
        .bind::<Text, _>(pattern)
        .bind::<BigInt, _>(limit(params));
    match params.dialog_id {
        Some(dialog_id) => query.bind::<Integer, _>(dialog_id).load(conn).await,
        None => query.load(conn).await,
    }
}

async fn users_fts(
    conn: &mut AsyncPgConnection,
    regconfig: &str,
    params: &SearchParams,
) -> QueryResult<Vec<UserHit>> {
    let sql = format!(
        "SELECT id, telegram_id, username, first_name, last_name, bio FROM users \
         WHERE to_tsvector('{lang}', \
             coalesce(username, '') || ' ' || coalesce(first_name, '') || ' ' || \
             coalesce(last_name, '') || ' ' || coalesce(bio, '')) \
             @@ websearch_to_tsquery('{lang}', $1) \
         ORDER BY id DESC LIMIT $2",
        lang = regconfig,
    );
    diesel::sql_query(sql)
        .bind::<Text, _>(&params.q)
        .bind::<BigInt, _>(limit(params))
        .load(conn)
        .await
}

async fn users_substring(
    conn: &mut AsyncPgConnection,
    params: &SearchParams,
) -> QueryResult<Vec<UserHit>> {
    let pattern = format!("%{}%", params.q);
    diesel::sql_query(
        "SELECT id, telegram_id, username, first_name, last_name, bio FROM users \
         WHERE username ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1 OR bio ILIKE $1 \
         ORDER BY id DESC LIMIT $2",
    )
    .bind::<Text, _>(pattern)
    .bind::<BigInt, _>(limit(params))
    .load(conn)
    .await
}

async fn detections_fts(
    conn: &mut AsyncPgConnection,
    regconfig: &str,
    params: &SearchParams,
) -> QueryResult<Vec<DetectionHit>> {
    let type_filter = match params.detection_type {
        Some(_) => "AND detection_type = $3",
        None => "",
    };
    let sql = format!(
        "SELECT id, message_id, detection_type, matched_text, normalized_value FROM detections \
         WHERE to_tsvector('{lang}', matched_text || ' ' || coalesce(context_before, '') || ' ' || coalesce(context_after, '')) \
             @@ websearch_to_tsquery('{lang}', $1) \
         {type_filter} ORDER BY id DESC LIMIT $2",
        lang = regconfig,
        type_filter = type_filter,
    );
    let query = diesel::sql_query(sql)
        .bind::<Text, _>(&params.q)
        .bind::<BigInt, _>(limit(params));
    match &params.detection_type {
        Some(t) => query.bind::<Text, _>(t).load(conn).await,
        None => query.load(conn).await,
    }
}

async fn detections_substring(
    conn: &mut AsyncPgConnection,
    params: &SearchParams,
) -> QueryResult<Vec<DetectionHit>> {
    let type_filter = match params.detection_type {
        Some(_) => "AND detection_type = $3",
        None => "",
    };
    let sql = format!(
        "SELECT id, message_id, detection_type, matched_text, normalized_value FROM detections \
         WHERE (matched_text ILIKE $1 OR normalized_value ILIKE $1) {type_filter} \
         ORDER BY id DESC LIMIT $2",
        type_filter = type_filter,
    );
    let pattern = format!("%{}%", params.q);
    let query = diesel::sql_query(sql)
        .bind::<Text, _>(pattern)
        .bind::<BigInt, _>(limit(params));
    match &params.detection_type {
        Some(t) => query.bind::<Text, _>(t).load(conn).await,
        None => query.load(conn).await,
    }
}

pub async fn search(
    conn: &mut AsyncPgConnection,
    regconfig: &str,
    config: &SearchConfig,
    params: &SearchParams,
) -> QueryResult<SearchResults> {
    let mut results = SearchResults::default();

    if wants(params, "messages") {
        results.messages = match messages_fts(conn, regconfig, params).await {
            Ok(hits) if !hits.is_empty() => hits,
            Ok(hits) => {
                if config.fallback_to_substring {
                    messages_substring(conn, params).await?
                } else {
                    hits
                }
            }
            Err(e) => {
                if config.log_failures {
                    warn!(error = %e, "Message FTS query failed");
                }
                if config.fallback_to_substring {
                    messages_substring(conn, params).await?
                } else {
                    return Err(e);
                }
            }
        };
    }

    if wants(params, "users") {
        results.users = match users_fts(conn, regconfig, params).await {
            Ok(hits) if !hits.is_empty() => hits,
            Ok(hits) => {
                if config.fallback_to_substring {
                    users_substring(conn, params).await?
                } else {
                    hits
                }
            }
            Err(e) => {
                if config.log_failures {
                    warn!(error = %e, "User FTS query failed");
                }
                if config.fallback_to_substring {
                    users_substring(conn, params).await?
                } else {
                    return Err(e);
                }
            }
        };
    }

    if wants(params, "detections") {
        results.detections = match detections_fts(conn, regconfig, params).await {
            Ok(hits) if !hits.is_empty() => hits,
            Ok(hits) => {
                if config.fallback_to_substring {
                    detections_substring(conn, params).await?
                } else {
                    hits
                }
            }
            Err(e) => {
                if config.log_failures {
                    warn!(error = %e, "Detection FTS query failed");
                }
                if config.fallback_to_substring {
                    detections_substring(conn, params).await?
                } else {
                    return Err(e);
                }
            }
        };
    }

    Ok(results)
}
