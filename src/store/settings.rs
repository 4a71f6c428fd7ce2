// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::schema::settings;

pub async fn get(
    conn: &mut AsyncPgConnection,
    key: &str,
) -> QueryResult<Option<serde_json::Value>> {
    settings::table
        .find(key)
        .select(settings::value)
        .first(conn)
        .await
        .optional()
}

pub async fn set(
    conn: &mut AsyncPgConnection,
    key: &str,
    value: &serde_json::Value,
) -> QueryResult<usize> {
    diesel::insert_into(settings::table)
        .values((
            settings::key.eq(key),
            settings::value.eq(value),
            settings::updated_at.eq(Utc::now().naive_utc()),
        ))
        .on_conflict(settings::key)
        .do_update()
        .set((
            settings::value.eq(value),
            settings::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
        .await
}
