// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::extract::builtin::BUILTIN_DETECTORS;
use crate::models::detection::{Detection, Detector, NewDetection, NewDetector};
use crate::schema::{detections, detectors};
use crate::store::BATCH_SIZE;

/// Seed the builtin detector set. Existing rows (possibly user-tuned) are
/// left untouched.
pub async fn ensure_builtin(conn: &mut AsyncPgConnection) -> QueryResult<usize> {
    let rows: Vec<NewDetector> = BUILTIN_DETECTORS
        .iter()
        .map(|(name, pattern, category, description, priority)| NewDetector {
            name: name.to_string(),
            pattern: pattern.to_string(),
            category: category.to_string(),
            description: Some(description.to_string()),
            priority: *priority,
            is_builtin: true,
            is_active: true,
        })
        .collect();

    diesel::insert_into(detectors::table)
        .values(&rows)
        .on_conflict(detectors::name)
        .do_nothing()
        .execute(conn)
        .await
}

/// Active detectors in priority-descending order, the order scans run in.
pub async fn active_detectors(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Detector>> {
    detectors::table
        .filter(detectors::is_active.eq(true))
        .order_by(detectors::priority.desc())
        .then_order_by(detectors::id.asc())
        .select(Detector::as_select())
        .load(conn)
        .await
}

pub async fn list_detectors(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Detector>> {
    detectors::table
        .order_by(detectors::priority.desc())
        .select(Detector::as_select())
        .load(conn)
        .await
}

pub async fn create_detector(
    conn: &mut AsyncPgConnection,
    detector: &NewDetector,
) -> QueryResult<Detector> {
    diesel::insert_into(detectors::table)
        .values(detector)
        .returning(Detector::as_returning())
        .get_result(conn)
        .await
}

pub async fn set_detector_active(
    conn: &mut AsyncPgConnection,
    id: i32,
    active: bool,
) -> QueryResult<usize> {
    diesel::update(detectors::table.find(id))
        .set(detectors::is_active.eq(active))
        .execute(conn)
        .await
}

/// Insert a batch of detections; duplicates by (message, detector, match)
/// are the expected no-op. Returns the number of new rows.
pub async fn insert_batch(
    conn: &mut AsyncPgConnection,
    batch: &[NewDetection],
) -> QueryResult<usize> {
    let mut inserted = 0;
    for chunk in batch.chunks(BATCH_SIZE) {
        inserted += diesel::insert_into(detections::table)
            .values(chunk)
            .on_conflict((
                detections::message_id,
                detections::detector_id,
                detections::matched_text,
            ))
            .do_nothing()
            .execute(conn)
            .await?;
    }
    Ok(inserted)
}

pub async fn for_message(
    conn: &mut AsyncPgConnection,
    message_id: i64,
) -> QueryResult<Vec<Detection>> {
    detections::table
        .filter(detections::message_id.eq(message_id))
        .order_by(detections::id.asc())
        .select(Detection::as_select())
        .load(conn)
        .await
}

pub async fn count_by_type(
    conn: &mut AsyncPgConnection,
    detection_type: &str,
) -> QueryResult<i64> {
    detections::table
        .filter(detections::detection_type.eq(detection_type))
        .count()
        .get_result(conn)
        .await
}
