// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use crate::schema::media_files;

/// Download pipeline states.
pub mod processing {
    pub const PENDING: &str = "pending";
    pub const QUEUED: &str = "queued";
    pub const PROCESSING: &str = "processing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// Validator verdicts.
pub mod validation {
    pub const PENDING: &str = "pending";
    pub const VALID: &str = "valid";
    pub const INVALID: &str = "invalid";
    pub const CORRUPTED: &str = "corrupted";
}

/// Media kinds carried on messages.
pub mod file_type {
    pub const PHOTO: &str = "photo";
    pub const VIDEO: &str = "video";
    pub const GIF: &str = "gif";
    pub const AUDIO: &str = "audio";
    pub const VOICE: &str = "voice";
    pub const DOCUMENT: &str = "document";
    pub const STICKER: &str = "sticker";
    pub const VIDEO_NOTE: &str = "video_note";
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = media_files)]
pub struct MediaFile {
    pub id: i32,
    pub message_id: i64,
    pub dialog_id: i32,
    pub telegram_message_id: i64,
    pub file_type: String,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<f64>,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<String>,
    pub duplicate_of: Option<i32>,
    pub duplicate_detection_method: Option<String>,
    pub download_attempts: i32,
    pub last_download_attempt: Option<NaiveDateTime>,
    pub download_error: Option<String>,
    pub download_error_category: Option<String>,
    pub validation_status: String,
    pub processing_status: String,
    pub processing_priority: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = media_files)]
pub struct NewMediaFile {
    pub message_id: i64,
    pub dialog_id: i32,
    pub telegram_message_id: i64,
    pub file_type: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub validation_status: String,
    pub processing_status: String,
    pub processing_priority: i32,
}
