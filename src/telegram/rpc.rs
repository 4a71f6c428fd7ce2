// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Upstream RPC capability.
//!
//! The engine depends only on this interface; wire framing, the TL layer and
//! credential storage are the adapter's responsibility. The deterministic
//! in-memory adapter lives in [`crate::telegram::sim`]; a production adapter
//! wrapping a Telegram client library plugs in through [`RpcFactory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::account::Account;

/// Errors surfaced by upstream calls, already classified for retry policy.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("authentication code required")]
    AuthRequired,

    #[error("invalid login code")]
    InvalidCode,

    #[error("invalid 2FA password")]
    InvalidPassword,

    #[error("session banned")]
    SessionBanned,

    #[error("flood wait for {seconds}s")]
    FloodWait { seconds: u32 },

    #[error("temporary upstream failure: {0}")]
    Temporary(String),

    #[error("permanent upstream failure: {0}")]
    Permanent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// Retry classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimit,
    Temporary,
    Permanent,
}

impl RpcError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RpcError::FloodWait { .. } => ErrorCategory::RateLimit,
            RpcError::Temporary(_) => ErrorCategory::Temporary,
            _ => ErrorCategory::Permanent,
        }
    }

    /// Short tag recorded on failed media rows and logs.
    pub fn category_tag(&self) -> &'static str {
        match self.category() {
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Temporary => "temporary",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

impl From<RpcError> for crate::error::EngineError {
    fn from(e: RpcError) -> Self {
        use crate::error::EngineError;
        match e {
            RpcError::AuthRequired => EngineError::AuthRequired,
            RpcError::InvalidCode => EngineError::InvalidRequest("invalid login code".into()),
            RpcError::InvalidPassword => EngineError::Invalid2fa,
            RpcError::SessionBanned => EngineError::SessionBanned,
            RpcError::FloodWait { seconds } => EngineError::RateLimit { seconds },
            RpcError::Temporary(c) => EngineError::Temporary(c),
            RpcError::Permanent(c) => EngineError::Permanent(c),
            RpcError::NotFound(c) => EngineError::NotFound(c),
            RpcError::PermissionDenied(c) => EngineError::PermissionDenied(c),
        }
    }
}

/// The authenticated user behind a session.
#[derive(Debug, Clone, Default)]
pub struct RpcUser {
    pub id: i64,
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
    pub last_seen: Option<DateTime<Utc>>,
}

/// A dialog as listed upstream.
#[derive(Debug, Clone)]
pub struct RpcDialog {
    pub id: i64,
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub member_count: Option<i32>,
}

/// Media descriptor attached to a message.
#[derive(Debug, Clone)]
pub struct RpcMedia {
    pub kind: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

/// A message as delivered upstream (live or historical).
#[derive(Debug, Clone)]
pub struct RpcMessage {
    pub id: i64,
    pub dialog_id: i64,
    pub sender_id: Option<i64>,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub reply_to: Option<i64>,
    pub grouped_id: Option<i64>,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub reactions: HashMap<String, i32>,
    pub media: Option<RpcMedia>,
}

/// A member of a dialog with membership metadata.
#[derive(Debug, Clone)]
pub struct RpcParticipant {
    pub user: RpcUser,
    pub joined_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub admin_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RpcProfilePhoto {
    pub photo_id: i64,
    pub is_video: bool,
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RpcStory {
    pub story_id: i64,
    pub caption: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub views_count: Option<i32>,
    pub is_pinned: bool,
}

/// Raw media bytes plus probe metadata.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<f64>,
}

/// Resolved preview of an invite link.
#[derive(Debug, Clone)]
pub struct InvitePreview {
    pub invite_hash: String,
    pub title: Option<String>,
    pub about: Option<String>,
    pub member_count: Option<i32>,
    pub is_channel: Option<bool>,
}

/// Outcome of a connect attempt.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    CodeRequired,
    Authorized(RpcUser),
}

/// Outcome of submitting a login code.
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    PasswordRequired,
    Authorized(RpcUser),
}

/// Outcome of a join attempt; non-error shapes map onto invite statuses.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Joined(RpcDialog),
    AlreadyJoined(RpcDialog),
    RequestPending,
    Invalid,
    Expired,
}

/// Live events pushed by the upstream connection. The channel is bounded;
/// overflow drops the oldest events and the session counts the loss.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    NewMessage(RpcMessage),
    MessageEdited(RpcMessage),
    MessagesDeleted { dialog_id: i64, message_ids: Vec<i64> },
    ParticipantUpdate { dialog_id: i64, user: RpcUser },
}

/// One authenticated upstream connection. Implementations must be safe to
/// call from a single task at a time; the session actor serializes access.
#[async_trait]
pub trait TelegramRpc: Send + Sync {
    async fn connect(&self) -> Result<ConnectOutcome, RpcError>;
    async fn sign_in_code(&self, code: &str) -> Result<SignInOutcome, RpcError>;
    async fn sign_in_password(&self, password: &str) -> Result<RpcUser, RpcError>;
    async fn disconnect(&self) -> Result<(), RpcError>;

    async fn list_dialogs(&self) -> Result<Vec<RpcDialog>, RpcError>;

    /// One page of history strictly older than `offset_id` (0 = newest),
    /// newest first. An empty page means the history is exhausted.
    async fn history_page(
        &self,
        dialog_id: i64,
        offset_id: i64,
        page_size: usize,
    ) -> Result<Vec<RpcMessage>, RpcError>;

    async fn download_media(
        &self,
        dialog_id: i64,
        message_id: i64,
    ) -> Result<MediaPayload, RpcError>;

    async fn get_entity(&self, user_id: i64) -> Result<RpcUser, RpcError>;
    async fn participants(&self, dialog_id: i64) -> Result<Vec<RpcParticipant>, RpcError>;

    async fn profile_photos(&self, user_id: i64) -> Result<Vec<RpcProfilePhoto>, RpcError>;
    async fn download_profile_photo(
        &self,
        user_id: i64,
        photo_id: i64,
    ) -> Result<MediaPayload, RpcError>;

    async fn stories(&self, user_id: i64) -> Result<Vec<RpcStory>, RpcError>;
    async fn download_story(&self, user_id: i64, story_id: i64)
        -> Result<MediaPayload, RpcError>;

    async fn resolve_invite(&self, hash: &str) -> Result<InvitePreview, RpcError>;
    async fn join_invite(&self, hash: &str) -> Result<JoinOutcome, RpcError>;

    /// Subscribe to live events for this connection.
    fn subscribe(&self) -> broadcast::Receiver<LiveEvent>;
}

/// Opens upstream connections for accounts. The session blob for an account
/// lives at `<session_root>/<account_id>.session` and is opaque to the core.
#[async_trait]
pub trait RpcFactory: Send + Sync {
    async fn create(
        &self,
        account: &Account,
        session_path: &Path,
    ) -> Result<Arc<dyn TelegramRpc>, RpcError>;
}
