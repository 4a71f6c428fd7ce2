// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::invites;

/// Invite lifecycle states.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const JOINED: &str = "joined";
    pub const ALREADY_JOINED: &str = "already_joined";
    pub const REQUEST_PENDING: &str = "request_pending";
    pub const FAILED: &str = "failed";
    pub const EXPIRED: &str = "expired";
    pub const INVALID: &str = "invalid";
    pub const PRIVATE: &str = "private";
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = invites)]
pub struct Invite {
    pub id: i32,
    pub link: String,
    pub invite_hash: String,
    pub status: String,
    pub retry_count: i32,
    pub title: Option<String>,
    pub about: Option<String>,
    pub member_count: Option<i32>,
    pub photo_path: Option<String>,
    pub is_channel: Option<bool>,
    pub source_dialog_id: Option<i32>,
    pub source_user_id: Option<i32>,
    pub joined_account_id: Option<i32>,
    pub joined_dialog_id: Option<i32>,
    pub joined_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invites)]
pub struct NewInvite {
    pub link: String,
    pub invite_hash: String,
    pub status: String,
    pub source_dialog_id: Option<i32>,
    pub source_user_id: Option<i32>,
}
