// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use crate::schema::stories;

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = stories)]
pub struct Story {
    pub id: i32,
    pub user_id: i32,
    pub telegram_story_id: i64,
    pub caption: Option<String>,
    pub file_path: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
    pub views_count: Option<i32>,
    pub is_pinned: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = stories)]
pub struct NewStory {
    pub user_id: i32,
    pub telegram_story_id: i64,
    pub caption: Option<String>,
    pub file_path: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
    pub views_count: Option<i32>,
    pub is_pinned: bool,
}
