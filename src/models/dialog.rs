// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::dialogs;

/// Dialog states. A dialog is monitored iff it is `active` and assigned.
pub mod status {
    pub const INACTIVE: &str = "inactive";
    pub const ACTIVE: &str = "active";
    pub const PAUSED: &str = "paused";
    pub const BACKFILLING: &str = "backfilling";
    pub const ERROR: &str = "error";
}

/// Dialog kinds as reported upstream.
pub mod kind {
    pub const USER: &str = "user";
    pub const GROUP: &str = "group";
    pub const SUPERGROUP: &str = "supergroup";
    pub const CHANNEL: &str = "channel";
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = dialogs)]
pub struct Dialog {
    pub id: i32,
    pub telegram_id: i64,
    pub dialog_type: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub member_count: Option<i32>,
    pub photo_path: Option<String>,
    pub account_id: Option<i32>,
    pub status: String,
    pub download_media: bool,
    pub ocr_enabled: bool,
    pub backfill_enabled: bool,
    pub is_monitoring: bool,
    pub last_message_id: Option<i64>,
    pub backfill_cursor: Option<i64>,
    pub last_error: Option<String>,
    pub last_member_scrape_at: Option<NaiveDateTime>,
    pub messages_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Dialog {
    /// Monitored means live events for this dialog are captured. A running
    /// backfill does not stop live capture; the unique message key keeps
    /// the two writers from duplicating rows.
    pub fn is_monitored(&self) -> bool {
        (self.status == status::ACTIVE || self.status == status::BACKFILLING)
            && self.account_id.is_some()
            && self.is_monitoring
    }

    /// Member listing is forbidden upstream for broadcast channels.
    pub fn supports_member_scrape(&self) -> bool {
        self.dialog_type == kind::GROUP || self.dialog_type == kind::SUPERGROUP
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dialogs)]
pub struct NewDialog {
    pub telegram_id: i64,
    pub dialog_type: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub member_count: Option<i32>,
    pub account_id: Option<i32>,
    pub status: String,
    pub download_media: bool,
    pub backfill_enabled: bool,
    pub is_monitoring: bool,
}

/// Per-dialog capture options settable through the command API.
#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = dialogs)]
pub struct DialogOptions {
    pub download_media: Option<bool>,
    pub ocr_enabled: Option<bool>,
    pub backfill_enabled: Option<bool>,
    pub is_monitoring: Option<bool>,
}
