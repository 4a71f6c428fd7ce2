// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Profile photo scanner: walks all users, records their photo history and
//! keeps exactly one photo marked current per user.

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::Database;
use crate::media::paths;
use crate::models::profile_photo::NewProfilePhoto;
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::retry::RetryPolicy;

pub struct ProfilePhotoScanner {
    db: Arc<Database>,
    manager: Arc<SessionManager>,
    retry: RetryPolicy,
    batch_size: i64,
    media_root: PathBuf,
}

impl ProfilePhotoScanner {
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

    /// One pass over all users in batches. Returns how many users had new
    /// photos recorded.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let handle = match self.manager.any_session().await {
            Some(handle) => handle,
            None => {
                debug!("No session available for photo scan");
                return Ok(0);
            }
        };

        let mut touched = 0;
        let mut after_id = 0;
        loop {
            let mut conn = self.db.get_connection().await?;
            let batch = store::users::photo_scan_batch(&mut conn, after_id, self.batch_size).await?;
            drop(conn);
            if batch.is_empty() {
                break;
            }
            after_id = batch.last().map(|u| u.id).unwrap_or(after_id);

            for user in &batch {
                let telegram_id = user.telegram_id;
                let outcome = self
                    .retry
                    .run("profile_photos", || {
                        let handle = handle.clone();
                        async move { handle.profile_photos(telegram_id).await }
                    })
                    .await;
                let photos = match outcome.result {
                    Ok(photos) => photos,
                    Err(e) => {
                        debug!(user_id = user.id, error = %e, "Photo listing failed");
                        continue;
                    }
                };
                if photos.is_empty() {
                    continue;
                }

                let mut conn = self.db.get_connection().await?;
                let known = store::profile_photos::known_photo_ids(&mut conn, user.id).await?;
                let newest = photos.iter().map(|p| p.photo_id).max();
                let mut saw_new = false;

                for photo in &photos {
                    if known.contains(&photo.photo_id) {
                        continue;
                    }
                    saw_new = true;
                    let row = NewProfilePhoto {
                        user_id: user.id,
                        telegram_photo_id: photo.photo_id,
                        is_current: false,
                        is_video: photo.is_video,
                        captured_at: photo.captured_at.map(|t| t.naive_utc()),
                        file_path: None,
                    };
                    let inserted = store::profile_photos::insert(&mut conn, &row).await?;

                    if let Some(photo_row_id) = inserted {
                        match handle.download_profile_photo(telegram_id, photo.photo_id).await {
                            Ok(payload) => {
                                match paths::store_content_addressed(
                                    &self.media_root,
                                    &payload.bytes,
                                    payload.file_name.as_deref(),
                                    payload.mime_type.as_deref(),
                                )
                                .await
                                {
                                    Ok(path) => {
                                        let path = path.to_string_lossy().to_string();
                                        store::profile_photos::set_file_path(
                                            &mut conn,
                                            photo_row_id,
                                            &path,
                                        )
                                        .await?;
                                        if newest == Some(photo.photo_id) {
                                            store::users::set_photo_path(
                                                &mut conn, user.id, &path,
                                            )
                                            .await?;
                                        }
                                    }
                                    Err(e) => {
                                        warn!(user_id = user.id, error = %e, "Photo store failed")
                                    }
                                }
                            }
                            Err(e) => {
                                debug!(user_id = user.id, error = %e, "Photo download failed")
                            }
                        }
                    }
                }

                // The newest photo becomes current; the flip is atomic per
                // user.
                if let Some(newest) = newest {
                    let user_id = user.id;
                    conn.transaction::<_, diesel::result::Error, _>(|conn| {
                        async move {
                            store::profile_photos::set_current(conn, user_id, newest).await?;
                            Ok(())
                        }
                        .scope_boxed()
                    })
                    .await?;
                }

                if saw_new {
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }
}
