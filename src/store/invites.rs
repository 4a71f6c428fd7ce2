// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::invite::{status, Invite, NewInvite};
use crate::schema::invites;
use crate::telegram::rpc::InvitePreview;

/// Create an invite; an already-known link returns the existing row.
pub async fn create(conn: &mut AsyncPgConnection, invite: &NewInvite) -> QueryResult<Invite> {
    let inserted: Option<Invite> = diesel::insert_into(invites::table)
        .values(invite)
        .on_conflict(invites::link)
        .do_nothing()
        .returning(Invite::as_returning())
        .get_result(conn)
        .await
        .optional()?;

    match inserted {
        Some(row) => Ok(row),
        None => {
            invites::table
                .filter(invites::link.eq(&invite.link))
                .select(Invite::as_select())
                .first(conn)
                .await
        }
    }
}

pub async fn get(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<Option<Invite>> {
    invites::table
        .find(id)
        .select(Invite::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn list(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Invite>> {
    invites::table
        .order_by(invites::id.desc())
        .select(Invite::as_select())
        .load(conn)
        .await
}

pub async fn delete(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::delete(invites::table.find(id)).execute(conn).await
}

pub async fn set_status(
    conn: &mut AsyncPgConnection,
    id: i32,
    new_status: &str,
    error: Option<&str>,
) -> QueryResult<usize> {
    diesel::update(invites::table.find(id))
        .set((invites::status.eq(new_status), invites::last_error.eq(error)))
        .execute(conn)
        .await
}

pub async fn bump_retry(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::update(invites::table.find(id))
        .set(invites::retry_count.eq(invites::retry_count + 1))
        .execute(conn)
        .await
}

pub async fn update_preview(
    conn: &mut AsyncPgConnection,
    id: i32,
    preview: &InvitePreview,
) -> QueryResult<usize> {
    diesel::update(invites::table.find(id))
        .set((
            invites::title.eq(preview.title.clone()),
            invites::about.eq(preview.about.clone()),
            invites::member_count.eq(preview.member_count),
            invites::is_channel.eq(preview.is_channel),
        ))
        .execute(conn)
        .await
}

pub async fn mark_joined(
    conn: &mut AsyncPgConnection,
    id: i32,
    joined_status: &str,
    account_id: i32,
    dialog_id: i32,
) -> QueryResult<usize> {
    diesel::update(invites::table.find(id))
        .set((
            invites::status.eq(joined_status),
            invites::joined_account_id.eq(account_id),
            invites::joined_dialog_id.eq(dialog_id),
            invites::joined_at.eq(Utc::now().naive_utc()),
            invites::last_error.eq(None::<String>),
        ))
        .execute(conn)
        .await
}

/// Joins an account performed in the last rolling day; drives the daily cap.
pub async fn joins_in_last_day(
    conn: &mut AsyncPgConnection,
    account_id: i32,
) -> QueryResult<i64> {
    let since = Utc::now().naive_utc() - Duration::hours(24);
    invites::table
        .filter(invites::joined_account_id.eq(account_id))
        .filter(invites::joined_at.gt(since))
        .count()
        .get_result(conn)
        .await
}

/// Most recent join time of an account; drives rotation and join spacing.
pub async fn last_join_at(
    conn: &mut AsyncPgConnection,
    account_id: i32,
) -> QueryResult<Option<NaiveDateTime>> {
    invites::table
        .filter(invites::joined_account_id.eq(account_id))
        .select(diesel::dsl::max(invites::joined_at))
        .first::<Option<NaiveDateTime>>(conn)
        .await
}

pub async fn next_pending(conn: &mut AsyncPgConnection) -> QueryResult<Option<Invite>> {
    invites::table
        .filter(invites::status.eq(status::PENDING))
        .order_by(invites::id.asc())
        .select(Invite::as_select())
        .first(conn)
        .await
        .optional()
}
