// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use crate::schema::profile_photos;

#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = profile_photos)]
pub struct ProfilePhoto {
    pub id: i32,
    pub user_id: i32,
    pub telegram_photo_id: i64,
    pub is_current: bool,
    pub is_video: bool,
    pub captured_at: Option<NaiveDateTime>,
    pub file_path: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profile_photos)]
pub struct NewProfilePhoto {
    pub user_id: i32,
    pub telegram_photo_id: i64,
    pub is_current: bool,
    pub is_video: bool,
    pub captured_at: Option<NaiveDateTime>,
    pub file_path: Option<String>,
}
