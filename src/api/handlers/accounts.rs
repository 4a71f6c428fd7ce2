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
use crate::models::account::{status, NewAccount};
use crate::store;
use crate::telegram::rpc::{ConnectOutcome, SignInOutcome};

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub phone: String,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub proxy_type: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<i32>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
}

pub async fn create_account(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateAccountRequest>,
) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };

    let account = NewAccount {
        phone: req.phone,
        api_id: req.api_id.unwrap_or(engine.config.telegram.api_id),
        api_hash: req
            .api_hash
            .unwrap_or_else(|| engine.config.telegram.api_hash.clone()),
        status: status::NEW.to_string(),
        proxy_type: req.proxy_type,
        proxy_host: req.proxy_host,
        proxy_port: req.proxy_port,
        proxy_username: req.proxy_username,
        proxy_password: req.proxy_password,
    };

    match store::accounts::create(&mut conn, &account).await {
        Ok(created) => success(created),
        Err(e) => persistence_error(e),
    }
}

pub async fn list_accounts(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::accounts::list(&mut conn).await {
        Ok(accounts) => success(accounts),
        Err(e) => persistence_error(e),
    }
}

/// Accounts together with the dialogs they own.
pub async fn list_with_groups(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    let accounts = match store::accounts::list(&mut conn).await {
        Ok(accounts) => accounts,
        Err(e) => return persistence_error(e),
    };
    let mut result = Vec::with_capacity(accounts.len());
    for account in accounts {
        let dialogs = match store::dialogs::list(&mut conn, Some(account.id)).await {
            Ok(dialogs) => dialogs,
            Err(e) => return persistence_error(e),
        };
        result.push(json!({
            "account": account,
            "dialogs": dialogs,
        }));
    }
    success(result)
}

pub async fn delete_account(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    if let Err(e) = engine.manager.disconnect(id).await {
        return error(&e);
    }
    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    match store::accounts::delete(&mut conn, id).await {
        Ok(0) => error(&crate::error::EngineError::NotFound(format!("account {}", id))),
        Ok(_) => success(json!({"deleted": id})),
        Err(e) => persistence_error(e),
    }
}

pub async fn connect(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match engine.manager.connect(id).await {
        Ok(ConnectOutcome::CodeRequired) => success(json!({"status": "code_required"})),
        Ok(ConnectOutcome::Authorized(user)) => success(json!({
            "status": "active",
            "user": {
                "id": user.id,
                "username": user.username,
                "first_name": user.first_name,
            },
        })),
        Err(e) => error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitCodeRequest {
    pub code: String,
}

pub async fn submit_code(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
    Json(req): Json<SubmitCodeRequest>,
) -> impl IntoResponse {
    match engine.manager.submit_code(id, &req.code).await {
        Ok(SignInOutcome::PasswordRequired) => success(json!({"status": "password_required"})),
        Ok(SignInOutcome::Authorized(user)) => success(json!({
            "status": "active",
            "user": {
                "id": user.id,
                "username": user.username,
                "first_name": user.first_name,
            },
        })),
        Err(e) => error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitPasswordRequest {
    pub password: String,
}

pub async fn submit_password(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
    Json(req): Json<SubmitPasswordRequest>,
) -> impl IntoResponse {
    match engine.manager.submit_password(id, &req.password).await {
        Ok(user) => success(json!({
            "status": "active",
            "user": {
                "id": user.id,
                "username": user.username,
                "first_name": user.first_name,
            },
        })),
        Err(e) => error(&e),
    }
}

pub async fn disconnect(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match engine.manager.disconnect(id).await {
        Ok(()) => success(json!({"status": "disconnected"})),
        Err(e) => error(&e),
    }
}
