// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Media download workers.
//!
//! Jobs reference a media row. A worker acquires a download slot on the
//! owning session, streams the bytes to a temp file while hashing, then
//! either links the row to an already stored identical file or moves the
//! temp file to its content-addressed path, validates it and records the
//! perceptual hash for images.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::config::Config;
use crate::db::Database;
use crate::media::{paths, phash, validate};
use crate::models::media::{file_type, processing, validation, MediaFile};
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::retry::RetryPolicy;
use crate::telegram::rpc::MediaPayload;
use crate::telegram::session::Priority;

/// How many completed perceptual hashes the near-duplicate scan compares
/// against.
const PHASH_SCAN_LIMIT: i64 = 500;

/// A download order for one media row.
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub media_file_id: i32,
    pub account_id: i32,
    /// Live captures outrank historical backfill on the session queue.
    pub live: bool,
}

pub struct MediaPipeline {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    manager: Arc<SessionManager>,
    config: Config,
    retry: RetryPolicy,
    slots: Arc<Semaphore>,
}

impl MediaPipeline {
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        manager: Arc<SessionManager>,
        config: Config,
    ) -> Arc<Self> {
        // One counted attempt per queue pass; the retry service owns
        // re-enqueueing up to MEDIA_RETRY_MAX_ATTEMPTS. Advised waits are
        // still honored inside the pass.
        let retry = RetryPolicy::new(1, config.media.retry_delay_base, config.telegram.retry_jitter);
        let slots = Arc::new(Semaphore::new(config.media.workers.max(1)));
        Arc::new(Self {
            db,
            bus,
            manager,
            config,
            retry,
            slots,
        })
    }

    /// Run the dispatcher until cancelled: each job takes a worker slot and
    /// processes concurrently up to the configured parallelism.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<MediaJob>, cancel: CancellationToken) {
        info!(workers = self.config.media.workers, "Media pipeline started");
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = match self.slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.process(job).await;
                drop(permit);
            });
        }
        info!("Media pipeline stopped");
    }

    async fn process(&self, job: MediaJob) {
        let mut conn = match self.db.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "No connection for media job");
                return;
            }
        };

        let media = match store::media::get(&mut conn, job.media_file_id).await {
            Ok(Some(media)) => media,
            Ok(None) => return,
            Err(e) => {
                error!(media_file_id = job.media_file_id, error = %e, "Media row load failed");
                return;
            }
        };
        if media.processing_status == processing::COMPLETED {
            debug!(media_file_id = media.id, "Media already completed, skipping");
            return;
        }

        let dialog = match store::dialogs::get(&mut conn, media.dialog_id).await {
            Ok(Some(dialog)) => dialog,
            _ => {
                let _ = store::media::mark_failed(
                    &mut conn,
                    media.id,
                    "permanent",
                    "dialog row missing",
                )
                .await;
                return;
            }
        };

        if let Err(e) = store::media::mark_processing(&mut conn, media.id).await {
            error!(media_file_id = media.id, error = %e, "Could not mark processing");
            return;
        }
        drop(conn);

        let handle = match self.manager.session(job.account_id).await {
            Some(handle) => handle,
            None => {
                self.fail(media.id, "temporary", "session not connected").await;
                return;
            }
        };

        let priority = if job.live {
            Priority::Live
        } else {
            Priority::Backfill
        };
        let telegram_dialog_id = dialog.telegram_id;
        let telegram_message_id = media.telegram_message_id;
        let timeout = self.config.media.download_timeout;

        let outcome = self
            .retry
            .run("download_media", || {
                let handle = handle.clone();
                async move {
                    match tokio::time::timeout(
                        timeout,
                        handle.download_media(priority, telegram_dialog_id, telegram_message_id),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(crate::telegram::rpc::RpcError::Temporary(
                            "media download timed out".into(),
                        )),
                    }
                }
            })
            .await;

        let payload = match outcome.result {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    media_file_id = media.id,
                    attempts = outcome.attempts,
                    error = %e,
                    "Media download failed"
                );
                self.fail(media.id, e.category_tag(), &e.to_string()).await;
                return;
            }
        };

        if let Err(e) = self.store_payload(&media, payload).await {
            error!(media_file_id = media.id, error = %e, "Storing media failed");
            self.fail(media.id, "temporary", &e.to_string()).await;
        }
    }

    /// Hash, dedup, persist and validate one downloaded payload.
    async fn store_payload(&self, media: &MediaFile, payload: MediaPayload) -> anyhow::Result<()> {
        let bytes = payload.bytes;
        let content_hash = hex::encode(Sha256::digest(&bytes));
        let file_size = bytes.len() as i64;

        let mut conn = self.db.get_connection().await?;

        // Stream to the scratch path while hashing; the hash names the file.
        let temp = paths::temp_path(&self.config.media.root, &content_hash);
        if let Some(parent) = temp.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&temp, &bytes).await?;

        // First-stage dedup: an identical byte sequence is already stored.
        if let Some(original) =
            store::media::find_completed_by_hash(&mut conn, &content_hash, media.id).await?
        {
            tokio::fs::remove_file(&temp).await.ok();
            store::media::mark_deduplicated(&mut conn, media.id, &original, &content_hash, file_size)
                .await?;
            info!(
                media_file_id = media.id,
                original_id = original.id,
                "Byte-identical media linked, no copy stored"
            );
            self.emit_downloaded(media, &content_hash, original.file_path.as_deref(), true)
                .await;
            return Ok(());
        }

        let ext = paths::extension(
            media.file_name.as_deref().or(payload.file_name.as_deref()),
            media.mime_type.as_deref().or(payload.mime_type.as_deref()),
        );
        let final_path = paths::final_path(&self.config.media.root, &content_hash, &ext);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&temp, &final_path).await?;

        // Validation runs on the stored file; failures delete the bytes.
        let probe = if self.config.media.validation_enabled {
            match validate::validate(&media.file_type, &bytes) {
                Ok(probe) => probe,
                Err(reason) => {
                    tokio::fs::remove_file(&final_path).await.ok();
                    store::media::mark_invalid(&mut conn, media.id, validation::INVALID, &reason)
                        .await?;
                    warn!(media_file_id = media.id, reason, "Media failed validation");
                    return Ok(());
                }
            }
        } else {
            validate::Probe::default()
        };

        let final_path_str = final_path.to_string_lossy().to_string();
        store::media::mark_completed(
            &mut conn,
            media.id,
            &final_path_str,
            &content_hash,
            file_size,
            probe
                .mime_type
                .as_deref()
                .or(payload.mime_type.as_deref())
                .or(media.mime_type.as_deref()),
            probe.width.or(payload.width),
            probe.height.or(payload.height),
            payload.duration,
        )
        .await?;

        // Second-stage dedup for images: flag near-duplicates, keep both.
        if media.file_type == file_type::PHOTO || media.file_type == file_type::STICKER {
            if let Some(hash) = phash::compute(&bytes) {
                let existing =
                    store::media::completed_phashes(&mut conn, media.id, PHASH_SCAN_LIMIT).await?;
                let threshold = self.config.media.phash_threshold;
                let near = existing.iter().find_map(|(id, other)| {
                    phash::distance(&hash, other)
                        .filter(|d| *d <= threshold)
                        .map(|_| *id)
                });
                store::media::set_perceptual_hash(&mut conn, media.id, &hash, near).await?;
                if let Some(original_id) = near {
                    debug!(
                        media_file_id = media.id,
                        original_id, "Perceptual near-duplicate flagged"
                    );
                }
            }
        }

        self.emit_downloaded(media, &content_hash, Some(final_path_str.as_str()), false)
            .await;
        Ok(())
    }

    async fn emit_downloaded(
        &self,
        media: &MediaFile,
        content_hash: &str,
        file_path: Option<&str>,
        deduplicated: bool,
    ) {
        self.bus
            .publish(DomainEvent::MediaDownloaded {
                media_file_id: media.id,
                message_id: media.message_id,
                dialog_id: media.dialog_id,
                content_hash: content_hash.to_string(),
                file_path: file_path.unwrap_or_default().to_string(),
                deduplicated,
            })
            .await;
    }

    async fn fail(&self, media_file_id: i32, category: &str, message: &str) {
        if let Ok(mut conn) = self.db.get_connection().await {
            if let Err(e) =
                store::media::mark_failed(&mut conn, media_file_id, category, message).await
            {
                error!(media_file_id, error = %e, "Could not record media failure");
            }
        }
    }
}
