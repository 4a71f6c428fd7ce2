// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::media::{processing, validation, MediaFile, NewMediaFile};
use crate::schema::media_files;

/// Insert the media row for a message. On conflict the row is updated only
/// when the new row carries a content hash, so a nil→hashed transition can
/// land without clobbering a completed row.
pub async fn insert(
    conn: &mut AsyncPgConnection,
    media: &NewMediaFile,
) -> QueryResult<Option<i32>> {
    if media.content_hash.is_some() {
        diesel::insert_into(media_files::table)
            .values(media)
            .on_conflict(media_files::message_id)
            .do_update()
            .set(media_files::content_hash.eq(media.content_hash.clone()))
            .returning(media_files::id)
            .get_result(conn)
            .await
            .map(Some)
    } else {
        diesel::insert_into(media_files::table)
            .values(media)
            .on_conflict(media_files::message_id)
            .do_nothing()
            .returning(media_files::id)
            .get_result(conn)
            .await
            .optional()
    }
}

pub async fn get(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<Option<MediaFile>> {
    media_files::table
        .find(id)
        .select(MediaFile::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn mark_processing(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::update(media_files::table.find(id))
        .set((
            media_files::processing_status.eq(processing::PROCESSING),
            media_files::download_attempts.eq(media_files::download_attempts + 1),
            media_files::last_download_attempt.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .await
}

/// Completion for a freshly stored file.
#[allow(clippy::too_many_arguments)]
pub async fn mark_completed(
    conn: &mut AsyncPgConnection,
    id: i32,
    file_path: &str,
    content_hash: &str,
    file_size: i64,
    mime_type: Option<&str>,
    width: Option<i32>,
    height: Option<i32>,
    duration: Option<f64>,
) -> QueryResult<usize> {
    diesel::update(media_files::table.find(id))
        .set((
            media_files::processing_status.eq(processing::COMPLETED),
            media_files::validation_status.eq(validation::VALID),
            media_files::file_path.eq(file_path),
            media_files::content_hash.eq(content_hash),
            media_files::file_size.eq(file_size),
            media_files::mime_type.eq(mime_type),
            media_files::width.eq(width),
            media_files::height.eq(height),
            media_files::duration.eq(duration),
            media_files::download_error.eq(None::<String>),
            media_files::download_error_category.eq(None::<String>),
        ))
        .execute(conn)
        .await
}

/// Completion for a byte-identical duplicate: the row points at the already
/// stored file, no bytes are copied.
pub async fn mark_deduplicated(
    conn: &mut AsyncPgConnection,
    id: i32,
    original: &MediaFile,
    content_hash: &str,
    file_size: i64,
) -> QueryResult<usize> {
    diesel::update(media_files::table.find(id))
        .set((
            media_files::processing_status.eq(processing::COMPLETED),
            media_files::validation_status.eq(validation::VALID),
            media_files::file_path.eq(original.file_path.clone()),
            media_files::content_hash.eq(content_hash),
            media_files::file_size.eq(file_size),
            media_files::mime_type.eq(original.mime_type.clone()),
            media_files::width.eq(original.width),
            media_files::height.eq(original.height),
            media_files::duration.eq(original.duration),
            media_files::duplicate_of.eq(original.id),
            media_files::duplicate_detection_method.eq("content_hash"),
        ))
        .execute(conn)
        .await
}

pub async fn mark_failed(
    conn: &mut AsyncPgConnection,
    id: i32,
    category: &str,
    error: &str,
) -> QueryResult<usize> {
    diesel::update(media_files::table.find(id))
        .set((
            media_files::processing_status.eq(processing::FAILED),
            media_files::download_error.eq(error),
            media_files::download_error_category.eq(category),
        ))
        .execute(conn)
        .await
}

/// Validation failure: the bytes were deleted, the row records why.
pub async fn mark_invalid(
    conn: &mut AsyncPgConnection,
    id: i32,
    verdict: &str,
    error: &str,
) -> QueryResult<usize> {
    diesel::update(media_files::table.find(id))
        .set((
            media_files::processing_status.eq(processing::FAILED),
            media_files::validation_status.eq(verdict),
            media_files::download_error.eq(error),
            media_files::download_error_category.eq("validation"),
        ))
        .execute(conn)
        .await
}

pub async fn set_queued(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::update(media_files::table.find(id))
        .set(media_files::processing_status.eq(processing::QUEUED))
        .execute(conn)
        .await
}

pub async fn set_perceptual_hash(
    conn: &mut AsyncPgConnection,
    id: i32,
    phash: &str,
    duplicate_of: Option<i32>,
) -> QueryResult<usize> {
    match duplicate_of {
        Some(original_id) => {
            diesel::update(media_files::table.find(id))
                .set((
                    media_files::perceptual_hash.eq(phash),
                    media_files::duplicate_of.eq(original_id),
                    media_files::duplicate_detection_method.eq("perceptual"),
                ))
                .execute(conn)
                .await
        }
        None => {
            diesel::update(media_files::table.find(id))
                .set(media_files::perceptual_hash.eq(phash))
                .execute(conn)
                .await
        }
    }
}

/// A completed row carrying the same content hash, if any.
pub async fn find_completed_by_hash(
    conn: &mut AsyncPgConnection,
    content_hash: &str,
    exclude_id: i32,
) -> QueryResult<Option<MediaFile>> {
    media_files::table
        .filter(media_files::content_hash.eq(content_hash))
        .filter(media_files::processing_status.eq(processing::COMPLETED))
        .filter(media_files::id.ne(exclude_id))
        .order_by(media_files::id.asc())
        .select(MediaFile::as_select())
        .first(conn)
        .await
        .optional()
}

/// Perceptual hashes of completed images, for the second-stage dedup scan.
pub async fn completed_phashes(
    conn: &mut AsyncPgConnection,
    exclude_id: i32,
    limit: i64,
) -> QueryResult<Vec<(i32, String)>> {
    media_files::table
        .filter(media_files::perceptual_hash.is_not_null())
        .filter(media_files::id.ne(exclude_id))
        .order_by(media_files::id.desc())
        .limit(limit)
        .select((media_files::id, media_files::perceptual_hash.assume_not_null()))
        .load(conn)
        .await
}

/// Rows the retry service may re-enqueue.
pub async fn retry_candidates(
    conn: &mut AsyncPgConnection,
    max_attempts: i32,
    limit: i64,
) -> QueryResult<Vec<MediaFile>> {
    media_files::table
        .filter(
            media_files::processing_status
                .eq(processing::FAILED)
                .or(media_files::processing_status.eq(processing::PENDING)),
        )
        .filter(media_files::download_attempts.lt(max_attempts))
        .filter(media_files::validation_status.ne(validation::INVALID))
        .order_by(media_files::processing_priority.desc())
        .then_order_by(media_files::id.asc())
        .limit(limit)
        .select(MediaFile::as_select())
        .load(conn)
        .await
}
