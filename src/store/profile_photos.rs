// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::profile_photo::{NewProfilePhoto, ProfilePhoto};
use crate::schema::profile_photos;

pub async fn known_photo_ids(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> QueryResult<Vec<i64>> {
    profile_photos::table
        .filter(profile_photos::user_id.eq(user_id))
        .select(profile_photos::telegram_photo_id)
        .load(conn)
        .await
}

/// Insert a photo observation; an existing (user, photo) row is untouched.
pub async fn insert(
    conn: &mut AsyncPgConnection,
    photo: &NewProfilePhoto,
) -> QueryResult<Option<i32>> {
    diesel::insert_into(profile_photos::table)
        .values(photo)
        .on_conflict((
            profile_photos::user_id,
            profile_photos::telegram_photo_id,
        ))
        .do_nothing()
        .returning(profile_photos::id)
        .get_result(conn)
        .await
        .optional()
}

/// Make one photo the current one; every other photo of the user is
/// demoted in the same statement pair (callers wrap this in a transaction).
pub async fn set_current(
    conn: &mut AsyncPgConnection,
    user_id: i32,
    telegram_photo_id: i64,
) -> QueryResult<usize> {
    diesel::update(
        profile_photos::table
            .filter(profile_photos::user_id.eq(user_id))
            .filter(profile_photos::is_current.eq(true)),
    )
    .set(profile_photos::is_current.eq(false))
    .execute(conn)
    .await?;

    diesel::update(
        profile_photos::table
            .filter(profile_photos::user_id.eq(user_id))
            .filter(profile_photos::telegram_photo_id.eq(telegram_photo_id)),
    )
    .set(profile_photos::is_current.eq(true))
    .execute(conn)
    .await
}

pub async fn set_file_path(
    conn: &mut AsyncPgConnection,
    id: i32,
    path: &str,
) -> QueryResult<usize> {
    diesel::update(profile_photos::table.find(id))
        .set(profile_photos::file_path.eq(path))
        .execute(conn)
        .await
}

pub async fn for_user(
    conn: &mut AsyncPgConnection,
    user_id: i32,
) -> QueryResult<Vec<ProfilePhoto>> {
    profile_photos::table
        .filter(profile_photos::user_id.eq(user_id))
        .order_by(profile_photos::telegram_photo_id.desc())
        .select(ProfilePhoto::as_select())
        .load(conn)
        .await
}
