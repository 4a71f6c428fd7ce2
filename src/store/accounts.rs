// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::account::{status, Account, NewAccount};
use crate::schema::accounts;

pub async fn create(conn: &mut AsyncPgConnection, account: &NewAccount) -> QueryResult<Account> {
    diesel::insert_into(accounts::table)
        .values(account)
        .returning(Account::as_returning())
        .get_result(conn)
        .await
}

pub async fn get(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<Option<Account>> {
    accounts::table
        .find(id)
        .select(Account::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn list(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Account>> {
    accounts::table
        .order_by(accounts::id.asc())
        .select(Account::as_select())
        .load(conn)
        .await
}

pub async fn delete(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<usize> {
    diesel::delete(accounts::table.find(id)).execute(conn).await
}

/// Accounts that were authorized when the process last ran.
pub async fn active(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Account>> {
    accounts::table
        .filter(accounts::status.eq(status::ACTIVE))
        .select(Account::as_select())
        .load(conn)
        .await
}

pub async fn set_status(
    conn: &mut AsyncPgConnection,
    id: i32,
    new_status: &str,
) -> QueryResult<usize> {
    diesel::update(accounts::table.find(id))
        .set(accounts::status.eq(new_status))
        .execute(conn)
        .await
}

pub async fn set_flood_wait(
    conn: &mut AsyncPgConnection,
    id: i32,
    until: Option<NaiveDateTime>,
) -> QueryResult<usize> {
    let new_status = if until.is_some() {
        status::FLOOD_WAIT
    } else {
        status::ACTIVE
    };
    diesel::update(accounts::table.find(id))
        .set((
            accounts::flood_wait_until.eq(until),
            accounts::status.eq(new_status),
        ))
        .execute(conn)
        .await
}

pub async fn record_error(
    conn: &mut AsyncPgConnection,
    id: i32,
    message: &str,
) -> QueryResult<usize> {
    diesel::update(accounts::table.find(id))
        .set((
            accounts::errors_count.eq(accounts::errors_count + 1),
            accounts::last_error.eq(message),
        ))
        .execute(conn)
        .await
}

/// Store the authorized identity after a successful sign-in.
pub async fn mark_authorized(
    conn: &mut AsyncPgConnection,
    id: i32,
    telegram_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> QueryResult<usize> {
    diesel::update(accounts::table.find(id))
        .set((
            accounts::telegram_id.eq(telegram_id),
            accounts::username.eq(username),
            accounts::first_name.eq(first_name),
            accounts::last_name.eq(last_name),
            accounts::status.eq(status::ACTIVE),
            accounts::last_activity.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .await
}

pub async fn bump_messages_collected(
    conn: &mut AsyncPgConnection,
    id: i32,
    by: i64,
) -> QueryResult<usize> {
    diesel::update(accounts::table.find(id))
        .set((
            accounts::messages_collected.eq(accounts::messages_collected + by),
            accounts::last_activity.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .await
}
