// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Story scanner: collects active stories for users known to have them.
//! Runs on a short cadence since stories expire upstream.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::db::Database;
use crate::media::paths;
use crate::models::story::NewStory;
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::retry::RetryPolicy;

pub struct StoryScanner {
    db: Arc<Database>,
    manager: Arc<SessionManager>,
    retry: RetryPolicy,
    batch_size: i64,
    media_root: PathBuf,
}

impl StoryScanner {
    pub fn new(db: Arc<Database>, manager: Arc<SessionManager>, config: &Config) -> Self {
        Self {
            db,
            manager,
            retry: RetryPolicy::new(
                config.enrichment.max_retries,
                config.telegram.retry_delay_base,
                config.telegram.retry_jitter,
            ),
            batch_size: config.enrichment.batch_size,
            media_root: config.media.root.clone(),
        }
    }

    /// One pass over users flagged as having stories. Returns how many
    /// stories were recorded.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let handle = match self.manager.any_session().await {
            Some(handle) => handle,
            None => {
                debug!("No session available for story scan");
                return Ok(0);
            }
        };

        let mut recorded = 0;
        let mut after_id = 0;
        loop {
            let mut conn = self.db.get_connection().await?;
            let batch = store::users::with_stories(&mut conn, after_id, self.batch_size).await?;
            drop(conn);
            if batch.is_empty() {
                break;
            }
            after_id = batch.last().map(|u| u.id).unwrap_or(after_id);

            for user in &batch {
                let telegram_id = user.telegram_id;
                let outcome = self
                    .retry
                    .run("stories", || {
                        let handle = handle.clone();
                        async move { handle.stories(telegram_id).await }
                    })
                    .await;
                let stories = match outcome.result {
                    Ok(stories) => stories,
                    Err(e) => {
                        debug!(user_id = user.id, error = %e, "Story listing failed");
                        continue;
                    }
                };

                let mut conn = self.db.get_connection().await?;
                for story in &stories {
                    let row = NewStory {
                        user_id: user.id,
                        telegram_story_id: story.story_id,
                        caption: story.caption.clone(),
                        file_path: None,
                        expires_at: story.expires_at.map(|t| t.naive_utc()),
                        views_count: story.views_count,
                        is_pinned: story.is_pinned,
                    };
                    let story_row_id = store::stories::upsert(&mut conn, &row).await?;
                    recorded += 1;

                    if store::stories::has_file(&mut conn, story_row_id).await? {
                        continue;
                    }
                    match handle.download_story(telegram_id, story.story_id).await {
                        Ok(payload) => {
                            if let Ok(path) = paths::store_content_addressed(
                                &self.media_root,
                                &payload.bytes,
                                payload.file_name.as_deref(),
                                payload.mime_type.as_deref(),
                            )
                            .await
                            {
                                let path = path.to_string_lossy().to_string();
                                store::stories::set_file_path(&mut conn, story_row_id, &path)
                                    .await?;
                            }
                        }
                        Err(e) => debug!(user_id = user.id, error = %e, "Story download failed"),
                    }
                }
            }
        }
        Ok(recorded)
    }
}
