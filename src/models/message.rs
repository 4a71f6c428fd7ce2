// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::messages;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i64,
    pub telegram_message_id: i64,
    pub dialog_id: i32,
    pub user_id: Option<i32>,
    pub date: NaiveDateTime,
    pub text: Option<String>,
    pub reply_to_message_id: Option<i64>,
    pub grouped_id: Option<i64>,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub reactions: Option<serde_json::Value>,
    pub media_type: Option<String>,
    pub has_media: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub telegram_message_id: i64,
    pub dialog_id: i32,
    pub user_id: Option<i32>,
    pub date: NaiveDateTime,
    pub text: Option<String>,
    pub reply_to_message_id: Option<i64>,
    pub grouped_id: Option<i64>,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub reactions: Option<serde_json::Value>,
    pub media_type: Option<String>,
    pub has_media: bool,
}
