// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::message::{Message, NewMessage};
use crate::schema::messages;
use crate::store::BATCH_SIZE;

/// Result of a single-message upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Existed,
}

impl UpsertOutcome {
    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            UpsertOutcome::Inserted(id) => Some(*id),
            UpsertOutcome::Existed => None,
        }
    }
}

/// Insert a message once. The (upstream id, dialog) key makes replays and
/// late events no-ops; the existing row keeps its immutable fields.
pub async fn upsert(
    conn: &mut AsyncPgConnection,
    message: &NewMessage,
) -> QueryResult<UpsertOutcome> {
    let inserted: Option<i64> = diesel::insert_into(messages::table)
        .values(message)
        .on_conflict((messages::telegram_message_id, messages::dialog_id))
        .do_nothing()
        .returning(messages::id)
        .get_result(conn)
        .await
        .optional()?;

    Ok(match inserted {
        Some(id) => UpsertOutcome::Inserted(id),
        None => UpsertOutcome::Existed,
    })
}

/// Batched insert for backfill pages. Returns (surrogate id, upstream id)
/// for the rows that were actually inserted; conflicts are silent.
pub async fn insert_batch(
    conn: &mut AsyncPgConnection,
    batch: &[NewMessage],
) -> QueryResult<Vec<(i64, i64)>> {
    let mut inserted = Vec::with_capacity(batch.len());
    for chunk in batch.chunks(BATCH_SIZE) {
        let rows: Vec<(i64, i64)> = diesel::insert_into(messages::table)
            .values(chunk)
            .on_conflict((messages::telegram_message_id, messages::dialog_id))
            .do_nothing()
            .returning((messages::id, messages::telegram_message_id))
            .get_results(conn)
            .await?;
        inserted.extend(rows);
    }
    Ok(inserted)
}

/// Refresh the mutable counters of an already captured message (edits,
/// periodic view scans). Missing rows are ignored.
pub async fn refresh_mutable(
    conn: &mut AsyncPgConnection,
    dialog_id: i32,
    telegram_message_id: i64,
    text: Option<&str>,
    views: Option<i32>,
    forwards: Option<i32>,
    reactions: Option<serde_json::Value>,
) -> QueryResult<usize> {
    diesel::update(
        messages::table
            .filter(messages::dialog_id.eq(dialog_id))
            .filter(messages::telegram_message_id.eq(telegram_message_id)),
    )
    .set((
        messages::text.eq(text),
        messages::views.eq(views),
        messages::forwards.eq(forwards),
        messages::reactions.eq(reactions),
    ))
    .execute(conn)
    .await
}

pub async fn get(conn: &mut AsyncPgConnection, id: i64) -> QueryResult<Option<Message>> {
    messages::table
        .find(id)
        .select(Message::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn count_for_dialog(conn: &mut AsyncPgConnection, dialog_id: i32) -> QueryResult<i64> {
    messages::table
        .filter(messages::dialog_id.eq(dialog_id))
        .count()
        .get_result(conn)
        .await
}

pub async fn recent_for_dialog(
    conn: &mut AsyncPgConnection,
    dialog_id: i32,
    limit: i64,
) -> QueryResult<Vec<Message>> {
    messages::table
        .filter(messages::dialog_id.eq(dialog_id))
        .order_by(messages::date.desc())
        .limit(limit)
        .select(Message::as_select())
        .load(conn)
        .await
}
