// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Persistence adapter.
//!
//! Every function takes an explicit connection so callers control transaction
//! boundaries. Duplicate-key conflicts are the expected no-op path and are
//! never surfaced; multi-row writes are chunked to keep transactions short.

pub mod accounts;
pub mod dialogs;
pub mod users;
pub mod messages;
pub mod media;
pub mod detections;
pub mod invites;
pub mod profile_photos;
pub mod stories;
pub mod settings;
pub mod search;

use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Maximum rows per batched insert statement.
pub const BATCH_SIZE: usize = 500;

/// Serialization failures are retried by write paths, up to this many times.
pub const SERIALIZATION_RETRIES: usize = 3;

pub fn is_serialization_error(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)
    )
}
