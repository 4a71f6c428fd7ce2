// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::dialog::{status, Dialog, DialogOptions, NewDialog};
use crate::schema::dialogs;

/// Insert or refresh a dialog by its upstream id. Assignment and status are
/// left untouched for existing rows; only the upstream-reported metadata is
/// refreshed.
pub async fn upsert(conn: &mut AsyncPgConnection, dialog: &NewDialog) -> QueryResult<Dialog> {
    diesel::insert_into(dialogs::table)
        .values(dialog)
        .on_conflict(dialogs::telegram_id)
        .do_update()
        .set((
            dialogs::title.eq(dialog.title.clone()),
            dialogs::username.eq(dialog.username.clone()),
            dialogs::member_count.eq(dialog.member_count),
        ))
        .returning(Dialog::as_returning())
        .get_result(conn)
        .await
}

pub async fn get(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<Option<Dialog>> {
    dialogs::table
        .find(id)
        .select(Dialog::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn get_by_telegram_id(
    conn: &mut AsyncPgConnection,
    telegram_id: i64,
) -> QueryResult<Option<Dialog>> {
    dialogs::table
        .filter(dialogs::telegram_id.eq(telegram_id))
        .select(Dialog::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn list(
    conn: &mut AsyncPgConnection,
    account_id: Option<i32>,
) -> QueryResult<Vec<Dialog>> {
    let query = dialogs::table.order_by(dialogs::id.asc()).into_boxed();
    let query = match account_id {
        Some(id) => query.filter(dialogs::account_id.eq(id)),
        None => query,
    };
    query.select(Dialog::as_select()).load(conn).await
}

pub async fn monitored_for_account(
    conn: &mut AsyncPgConnection,
    account_id: i32,
) -> QueryResult<Vec<Dialog>> {
    dialogs::table
        .filter(dialogs::account_id.eq(account_id))
        .filter(dialogs::status.eq(status::ACTIVE))
        .filter(dialogs::is_monitoring.eq(true))
        .select(Dialog::as_select())
        .load(conn)
        .await
}

pub async fn set_account(
    conn: &mut AsyncPgConnection,
    id: i32,
    account_id: Option<i32>,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::account_id.eq(account_id))
        .execute(conn)
        .await
}

pub async fn set_status(
    conn: &mut AsyncPgConnection,
    id: i32,
    new_status: &str,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::status.eq(new_status))
        .execute(conn)
        .await
}

pub async fn set_error(
    conn: &mut AsyncPgConnection,
    id: i32,
    message: &str,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set((
            dialogs::status.eq(status::ERROR),
            dialogs::last_error.eq(message),
        ))
        .execute(conn)
        .await
}

pub async fn set_options(
    conn: &mut AsyncPgConnection,
    id: i32,
    options: &DialogOptions,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(options)
        .execute(conn)
        .await
}

pub async fn set_monitoring(
    conn: &mut AsyncPgConnection,
    id: i32,
    monitoring: bool,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::is_monitoring.eq(monitoring))
        .execute(conn)
        .await
}

/// Persist the backfill frontier after a committed page.
pub async fn set_backfill_cursor(
    conn: &mut AsyncPgConnection,
    id: i32,
    cursor: Option<i64>,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::backfill_cursor.eq(cursor))
        .execute(conn)
        .await
}

/// Advance the high-water mark of observed live message ids. Never moves
/// backwards, so late events cannot regress it.
pub async fn advance_last_message_id(
    conn: &mut AsyncPgConnection,
    id: i32,
    message_id: i64,
) -> QueryResult<usize> {
    diesel::update(
        dialogs::table.find(id).filter(
            dialogs::last_message_id
                .lt(message_id)
                .or(dialogs::last_message_id.is_null()),
        ),
    )
    .set(dialogs::last_message_id.eq(message_id))
    .execute(conn)
    .await
}

pub async fn bump_messages_count(
    conn: &mut AsyncPgConnection,
    id: i32,
    by: i64,
) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::messages_count.eq(dialogs::messages_count + by))
        .execute(conn)
        .await
}

/// Dialogs whose member list is due for a scrape.
pub async fn due_for_member_scrape(
    conn: &mut AsyncPgConnection,
    cutoff: NaiveDateTime,
    limit: i64,
) -> QueryResult<Vec<Dialog>> {
    dialogs::table
        .filter(dialogs::status.eq(status::ACTIVE))
        .filter(dialogs::account_id.is_not_null())
        .filter(
            dialogs::last_member_scrape_at
                .lt(cutoff)
                .or(dialogs::last_member_scrape_at.is_null()),
        )
        .order_by(dialogs::last_member_scrape_at.asc())
        .limit(limit)
        .select(Dialog::as_select())
        .load(conn)
        .await
}

pub async fn mark_member_scraped(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::last_member_scrape_at.eq(Utc::now().naive_utc()))
        .execute(conn)
        .await
}

/// Put a dialog first in line for the next member scraper pass.
pub async fn clear_member_scraped(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::update(dialogs::table.find(id))
        .set(dialogs::last_member_scrape_at.eq(None::<NaiveDateTime>))
        .execute(conn)
        .await
}
