// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::{identity_changes, users};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_bot: bool,
    pub is_verified: bool,
    pub is_premium: bool,
    pub is_scam: bool,
    pub is_fake: bool,
    pub is_restricted: bool,
    pub is_deleted: bool,
    pub has_stories: bool,
    pub last_seen: Option<NaiveDateTime>,
    pub photo_path: Option<String>,
    pub messages_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_bot: bool,
    pub is_verified: bool,
    pub is_premium: bool,
    pub is_scam: bool,
    pub is_fake: bool,
    pub is_restricted: bool,
    pub is_deleted: bool,
    pub has_stories: bool,
    pub last_seen: Option<NaiveDateTime>,
}

impl NewUser {
    /// Minimal stub for a sender observed in a message before the user has
    /// been enriched.
    pub fn stub(telegram_id: i64) -> Self {
        NewUser {
            telegram_id,
            username: None,
            first_name: None,
            last_name: None,
            phone: None,
            bio: None,
            is_bot: false,
            is_verified: false,
            is_premium: false,
            is_scam: false,
            is_fake: false,
            is_restricted: false,
            is_deleted: false,
            has_stories: false,
            last_seen: None,
        }
    }
}

/// Append-only log of observed identity mutations.
#[derive(Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = identity_changes)]
pub struct IdentityChange {
    pub id: i32,
    pub user_id: i32,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = identity_changes)]
pub struct NewIdentityChange {
    pub user_id: i32,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}
