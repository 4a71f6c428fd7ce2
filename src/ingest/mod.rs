// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Message capture: live listening and historical backfill.

pub mod listener;
pub mod backfill;

use crate::extract::DetectionCandidate;
use crate::models::detection::NewDetection;
use crate::models::media::{processing, validation, NewMediaFile};
use crate::models::message::NewMessage;
use crate::models::user::NewUser;
use crate::telegram::rpc::{RpcMessage, RpcUser};

/// Shape an upstream user into its row.
pub fn user_row(user: &RpcUser) -> NewUser {
    NewUser {
        telegram_id: user.id,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        phone: user.phone.clone(),
        bio: user.bio.clone(),
        is_bot: user.is_bot,
        is_verified: user.is_verified,
        is_premium: user.is_premium,
        is_scam: user.is_scam,
        is_fake: user.is_fake,
        is_restricted: user.is_restricted,
        is_deleted: user.is_deleted,
        has_stories: user.has_stories,
        last_seen: user.last_seen.map(|t| t.naive_utc()),
    }
}

/// Shape an upstream message into its row.
pub fn normalize_message(dialog_id: i32, user_id: Option<i32>, msg: &RpcMessage) -> NewMessage {
    let reactions = if msg.reactions.is_empty() {
        None
    } else {
        serde_json::to_value(&msg.reactions).ok()
    };
    NewMessage {
        telegram_message_id: msg.id,
        dialog_id,
        user_id,
        date: msg.date.naive_utc(),
        text: msg.text.clone(),
        reply_to_message_id: msg.reply_to,
        grouped_id: msg.grouped_id,
        views: msg.views,
        forwards: msg.forwards,
        reactions,
        media_type: msg.media.as_ref().map(|m| m.kind.clone()),
        has_media: msg.media.is_some(),
    }
}

/// Shape the media row accompanying a captured message, queued for download.
pub fn media_row(
    dialog_id: i32,
    message_id: i64,
    msg: &RpcMessage,
    priority: i32,
) -> Option<NewMediaFile> {
    msg.media.as_ref().map(|media| NewMediaFile {
        message_id,
        dialog_id,
        telegram_message_id: msg.id,
        file_type: media.kind.clone(),
        file_name: media.file_name.clone(),
        file_size: media.file_size,
        mime_type: media.mime_type.clone(),
        content_hash: None,
        validation_status: validation::PENDING.to_string(),
        processing_status: processing::QUEUED.to_string(),
        processing_priority: priority,
    })
}

/// Tie extractor candidates to a stored message.
pub fn detection_rows(message_id: i64, candidates: &[DetectionCandidate]) -> Vec<NewDetection> {
    candidates
        .iter()
        .map(|c| NewDetection {
            message_id,
            detector_id: c.detector_id,
            detection_type: c.detection_type.clone(),
            matched_text: c.matched_text.clone(),
            normalized_value: c.normalized_value.clone(),
            context_before: Some(c.context_before.clone()),
            context_after: Some(c.context_after.clone()),
        })
        .collect()
}
