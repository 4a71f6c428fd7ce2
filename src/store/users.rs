// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::membership::NewMembership;
use crate::models::user::{NewIdentityChange, NewUser, User};
use crate::schema::{identity_changes, memberships, users};

/// Ensure a user row exists for a sender observed in a message. Returns the
/// surrogate id without touching an existing row.
pub async fn upsert_stub(conn: &mut AsyncPgConnection, telegram_id: i64) -> QueryResult<i32> {
    let inserted: Option<i32> = diesel::insert_into(users::table)
        .values(&NewUser::stub(telegram_id))
        .on_conflict(users::telegram_id)
        .do_nothing()
        .returning(users::id)
        .get_result(conn)
        .await
        .optional()?;

    match inserted {
        Some(id) => Ok(id),
        None => {
            users::table
                .filter(users::telegram_id.eq(telegram_id))
                .select(users::id)
                .first(conn)
                .await
        }
    }
}

/// Identity fields whose mutations are logged.
const IDENTITY_FIELDS: [&str; 4] = ["username", "first_name", "last_name", "phone"];

fn identity_value<'a>(user: &'a NewUser, field: &str) -> &'a Option<String> {
    match field {
        "username" => &user.username,
        "first_name" => &user.first_name,
        "last_name" => &user.last_name,
        _ => &user.phone,
    }
}

fn stored_identity_value<'a>(user: &'a User, field: &str) -> &'a Option<String> {
    match field {
        "username" => &user.username,
        "first_name" => &user.first_name,
        "last_name" => &user.last_name,
        _ => &user.phone,
    }
}

/// Full upsert with the identity merge policy: changes to username, names or
/// phone append an identity_changes row before the user row is updated.
/// Returns the surrogate id.
pub async fn upsert_full(conn: &mut AsyncPgConnection, user: &NewUser) -> QueryResult<i32> {
    let existing: Option<User> = users::table
        .filter(users::telegram_id.eq(user.telegram_id))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?;

    match existing {
        None => {
            diesel::insert_into(users::table)
                .values(user)
                .on_conflict(users::telegram_id)
                .do_update()
                .set(user)
                .returning(users::id)
                .get_result(conn)
                .await
        }
        Some(current) => {
            let changes: Vec<NewIdentityChange> = IDENTITY_FIELDS
                .iter()
                .filter_map(|field| {
                    let old = stored_identity_value(&current, field);
                    let new = identity_value(user, field);
                    // A vanished value upstream is not treated as a change;
                    // enrichment sources do not always carry every field.
                    if new.is_some() && old != new {
                        Some(NewIdentityChange {
                            user_id: current.id,
                            field: field.to_string(),
                            old_value: old.clone(),
                            new_value: new.clone(),
                        })
                    } else {
                        None
                    }
                })
                .collect();

            if !changes.is_empty() {
                diesel::insert_into(identity_changes::table)
                    .values(&changes)
                    .execute(conn)
                    .await?;
            }

            diesel::update(users::table.find(current.id))
                .set(user)
                .execute(conn)
                .await?;
            Ok(current.id)
        }
    }
}

pub async fn get(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<Option<User>> {
    users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn get_by_telegram_id(
    conn: &mut AsyncPgConnection,
    telegram_id: i64,
) -> QueryResult<Option<User>> {
    users::table
        .filter(users::telegram_id.eq(telegram_id))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn identity_history(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> QueryResult<Vec<crate::models::user::IdentityChange>> {
    identity_changes::table
        .filter(identity_changes::user_id.eq(user_id))
        .order_by(identity_changes::changed_at.asc())
        .select(crate::models::user::IdentityChange::as_select())
        .load(conn)
        .await
}

pub async fn set_photo_path(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    path: &str,
) -> QueryResult<usize> {
    diesel::update(users::table.find(user_id))
        .set(users::photo_path.eq(path))
        .execute(conn)
        .await
}

pub async fn bump_messages_count(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    by: i64,
) -> QueryResult<usize> {
    diesel::update(users::table.find(user_id))
        .set(users::messages_count.eq(users::messages_count + by))
        .execute(conn)
        .await
}

/// Page of users for the profile photo scan, oldest-updated first.
pub async fn photo_scan_batch(
    conn: &mut AsyncPgConnection,
    after_id: i32,
    limit: i64,
) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::id.gt(after_id))
        .filter(users::is_deleted.eq(false))
        .order_by(users::id.asc())
        .limit(limit)
        .select(User::as_select())
        .load(conn)
        .await
}

pub async fn with_stories(
    conn: &mut AsyncPgConnection,
    after_id: i32,
    limit: i64,
) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::id.gt(after_id))
        .filter(users::has_stories.eq(true))
        .order_by(users::id.asc())
        .limit(limit)
        .select(User::as_select())
        .load(conn)
        .await
}

/// Append or refresh a membership observation.
pub async fn upsert_membership(
    conn: &mut AsyncPgConnection,
    membership: &NewMembership,
) -> QueryResult<usize> {
    diesel::insert_into(memberships::table)
        .values(membership)
        .on_conflict((memberships::user_id, memberships::dialog_id))
        .do_update()
        .set((
            memberships::is_admin.eq(membership.is_admin),
            memberships::admin_title.eq(membership.admin_title.clone()),
            memberships::is_active.eq(membership.is_active),
        ))
        .execute(conn)
        .await
}

/// Mark members absent from the latest scrape as inactive.
pub async fn deactivate_missing_members(
    conn: &mut AsyncPgConnection,
    dialog_id: i32,
    seen_user_ids: &[i32],
    reason: &str,
) -> QueryResult<usize> {
    diesel::update(
        memberships::table
            .filter(memberships::dialog_id.eq(dialog_id))
            .filter(memberships::is_active.eq(true))
            .filter(memberships::user_id.ne_all(seen_user_ids)),
    )
    .set((
        memberships::is_active.eq(false),
        memberships::leave_reason.eq(reason),
    ))
    .execute(conn)
    .await
}
