// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Error kinds surfaced at component boundaries.

use thiserror::Error;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A login code must be submitted before the session can proceed.
    #[error("authentication code required")]
    AuthRequired,

    /// The submitted two-factor password was rejected.
    #[error("invalid 2FA password")]
    Invalid2fa,

    /// The account is banned upstream; terminal until user action.
    #[error("session banned")]
    SessionBanned,

    /// Server-advised wait; retryable after the deadline.
    #[error("rate limited for {seconds}s")]
    RateLimit { seconds: u32 },

    /// Transient failure; retryable with backoff.
    #[error("temporary failure: {0}")]
    Temporary(String),

    /// Non-retryable failure.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Entity does not exist upstream or locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// The session lacks access to the entity.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Media or payload failed validation.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Database failure that survived internal retries.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Request shape or state precondition violated.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable machine-readable kind tag for command results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::AuthRequired => "auth_required",
            EngineError::Invalid2fa => "invalid_2fa",
            EngineError::SessionBanned => "session_banned",
            EngineError::RateLimit { .. } => "rate_limit",
            EngineError::Temporary(_) => "temporary",
            EngineError::Permanent(_) => "permanent",
            EngineError::NotFound(_) => "not_found",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::ValidationFailed(_) => "validation_failed",
            EngineError::Persistence(_) => "persistence_error",
            EngineError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Only temporary and rate-limit errors retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Temporary(_) | EngineError::RateLimit { .. })
    }
}

impl From<diesel::result::Error> for EngineError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => EngineError::NotFound("row not found".into()),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}
