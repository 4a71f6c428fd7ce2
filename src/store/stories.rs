// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use diesel::prelude::*;
use diesel::QueryResult;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::story::{NewStory, Story};
use crate::schema::stories;

/// Upsert a story observation; view counts and pin state refresh on
/// conflict. Returns the surrogate id.
pub async fn upsert(conn: &mut AsyncPgConnection, story: &NewStory) -> QueryResult<i32> {
    diesel::insert_into(stories::table)
        .values(story)
        .on_conflict((stories::user_id, stories::telegram_story_id))
        .do_update()
        .set((
            stories::views_count.eq(story.views_count),
            stories::is_pinned.eq(story.is_pinned),
        ))
        .returning(stories::id)
        .get_result(conn)
        .await
}

pub async fn set_file_path(
    conn: &mut AsyncPgConnection,
    id: i32,
    path: &str,
) -> QueryResult<usize> {
    diesel::update(stories::table.find(id))
        .set(stories::file_path.eq(path))
        .execute(conn)
        .await
}

pub async fn for_user(conn: &mut AsyncPgConnection, user_id: i32) -> QueryResult<Vec<Story>> {
    stories::table
        .filter(stories::user_id.eq(user_id))
        .order_by(stories::telegram_story_id.desc())
        .select(Story::as_select())
        .load(conn)
        .await
}

pub async fn has_file(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<bool> {
    let path: Option<Option<String>> = stories::table
        .find(id)
        .select(stories::file_path)
        .first(conn)
        .await
        .optional()?;
    Ok(matches!(path, Some(Some(_))))
}
