// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::accounts;

/// Account lifecycle states. `banned` is terminal.
pub mod status {
    pub const NEW: &str = "new";
    pub const CODE_REQUIRED: &str = "code_required";
    pub const PASSWORD_REQUIRED: &str = "password_required";
    pub const ACTIVE: &str = "active";
    pub const FLOOD_WAIT: &str = "flood_wait";
    pub const BANNED: &str = "banned";
    pub const ERROR: &str = "error";
    pub const DISCONNECTED: &str = "disconnected";
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = accounts)]
pub struct Account {
    pub id: i32,
    pub phone: String,
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: Option<String>,
    pub telegram_id: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: String,
    pub proxy_type: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<i32>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub messages_collected: i64,
    pub errors_count: i32,
    pub flood_wait_until: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub last_activity: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = accounts)]
pub struct NewAccount {
    pub phone: String,
    pub api_id: i32,
    pub api_hash: String,
    pub status: String,
    pub proxy_type: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<i32>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
}
