// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Backfill coordinator.
//!
//! One resumable loop per dialog walks history pages toward older messages.
//! Every page commits in one transaction together with the cursor update, so
//! a restart resumes from the last committed frontier. Pages go through the
//! session queue at backfill priority; live events always get through first.

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::config::Config;
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::extract::Extractor;
use crate::ingest::{detection_rows, media_row, normalize_message};
use crate::media::MediaJob;
use crate::models::dialog::{status as dialog_status, Dialog};
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::retry::RetryPolicy;
use crate::telegram::rpc::RpcMessage;

/// Priority stored on media rows captured by backfill.
const BACKFILL_MEDIA_PRIORITY: i32 = 0;

pub struct BackfillCoordinator {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    manager: Arc<SessionManager>,
    extractor: Arc<Extractor>,
    media_tx: mpsc::Sender<MediaJob>,
    retry: RetryPolicy,
    page_size: usize,
    running: Mutex<HashMap<i32, CancellationToken>>,
    cancel: CancellationToken,
}

impl BackfillCoordinator {
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        manager: Arc<SessionManager>,
        extractor: Arc<Extractor>,
        media_tx: mpsc::Sender<MediaJob>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            bus,
            manager,
            extractor,
            media_tx,
            retry: RetryPolicy::new(
                config.telegram.retry_max_attempts,
                config.telegram.retry_delay_base,
                config.telegram.retry_jitter,
            ),
            page_size: config.backfill.page_size,
            running: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// Start backfill for a dialog. A second call while one is running
    /// observes the first and succeeds without effect.
    pub async fn start(self: Arc<Self>, dialog_id: i32) -> EngineResult<()> {
        let mut conn = self
            .db
            .get_connection()
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        let dialog = store::dialogs::get(&mut conn, dialog_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("dialog {}", dialog_id)))?;

        let account_id = dialog.account_id.ok_or_else(|| {
            EngineError::InvalidRequest(format!("dialog {} has no assigned account", dialog_id))
        })?;
        if !dialog.backfill_enabled {
            return Err(EngineError::InvalidRequest(format!(
                "backfill is disabled for dialog {}",
                dialog_id
            )));
        }

        {
            let mut running = self.running.lock().await;
            if running.contains_key(&dialog_id) {
                return Ok(());
            }
            let token = self.cancel.child_token();
            running.insert(dialog_id, token.clone());

            store::dialogs::set_status(&mut conn, dialog_id, dialog_status::BACKFILLING)
                .await
                .map_err(EngineError::from)?;
            drop(conn);

            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.run(dialog, account_id, token).await;
                coordinator.running.lock().await.remove(&dialog_id);
            });
        }
        Ok(())
    }

    /// Request a running backfill to stop after the in-flight page.
    pub async fn stop(&self, dialog_id: i32) -> bool {
        let running = self.running.lock().await;
        match running.get(&dialog_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, dialog_id: i32) -> bool {
        self.running.lock().await.contains_key(&dialog_id)
    }

    async fn run(&self, dialog: Dialog, account_id: i32, stop: CancellationToken) {
        let dialog_id = dialog.id;
        info!(
            dialog_id,
            cursor = ?dialog.backfill_cursor,
            "Backfill started"
        );

        let mut cursor = dialog.backfill_cursor.unwrap_or(0);
        let mut pages_done: u64 = 0;
        let mut messages_saved: u64 = 0;

        loop {
            if stop.is_cancelled() {
                info!(dialog_id, cursor, "Backfill stopped on request");
                self.finish(dialog_id, dialog.telegram_id, cursor, pages_done, messages_saved)
                    .await;
                return;
            }

            // A paused dialog stops dispatching pages; the committed cursor
            // lets a later start resume where this one left off.
            if let Ok(mut conn) = self.db.get_connection().await {
                match store::dialogs::get(&mut conn, dialog_id).await {
                    Ok(Some(current)) if current.status == dialog_status::PAUSED => {
                        info!(dialog_id, cursor, "Backfill paused");
                        return;
                    }
                    _ => {}
                }
            }

            let handle = match self.manager.session(account_id).await {
                Some(handle) => handle,
                None => {
                    self.fail(dialog_id, "session not connected").await;
                    return;
                }
            };

            let telegram_id = dialog.telegram_id;
            let page_size = self.page_size;
            let offset = cursor;
            let outcome = self
                .retry
                .run("history_page", || {
                    let handle = handle.clone();
                    async move { handle.history_page(telegram_id, offset, page_size).await }
                })
                .await;

            let page = match outcome.result {
                Ok(page) => page,
                Err(e) => {
                    error!(dialog_id, error = %e, "Backfill page failed");
                    self.fail(dialog_id, &e.to_string()).await;
                    return;
                }
            };

            if page.is_empty() {
                info!(dialog_id, cursor, pages_done, messages_saved, "Backfill complete");
                self.finish(dialog_id, dialog.telegram_id, cursor, pages_done, messages_saved)
                    .await;
                return;
            }

            let lowest_id = page.iter().map(|m| m.id).min().unwrap_or(cursor);
            match self.persist_page(&dialog, account_id, &page, lowest_id).await {
                Ok(inserted) => {
                    messages_saved += inserted as u64;
                    pages_done += 1;
                    cursor = lowest_id;
                }
                Err(e) => {
                    error!(dialog_id, error = %e, "Backfill page persist failed");
                    self.fail(dialog_id, &e.to_string()).await;
                    return;
                }
            }

            self.bus
                .publish(DomainEvent::BackfillProgress {
                    dialog_id,
                    dialog_telegram_id: dialog.telegram_id,
                    cursor,
                    pages_done,
                    messages_saved,
                    finished: false,
                })
                .await;
        }
    }

    /// Commit one page and the moved cursor atomically. Returns how many
    /// messages were new; rows already captured live stay untouched.
    async fn persist_page(
        &self,
        dialog: &Dialog,
        account_id: i32,
        page: &[RpcMessage],
        new_cursor: i64,
    ) -> anyhow::Result<usize> {
        let mut conn = self.db.get_connection().await?;

        let detectors = store::detections::active_detectors(&mut conn).await?;
        // Candidates are computed outside the transaction; only row writes
        // happen inside.
        let candidates: Vec<_> = page
            .iter()
            .map(|msg| {
                msg.text
                    .as_deref()
                    .map(|text| self.extractor.scan(&detectors, text))
                    .unwrap_or_default()
            })
            .collect();

        let dialog_id = dialog.id;
        let mut media_jobs: Vec<MediaJob> = Vec::new();

        let mut attempt = 0;
        let inserted_count = loop {
            attempt += 1;
            media_jobs.clear();
            let result = conn
            .transaction::<usize, diesel::result::Error, _>(|conn| {
                let media_jobs = &mut media_jobs;
                let candidates = &candidates;
                async move {
                    // Sender stubs first, one per unique sender.
                    let mut sender_ids: HashMap<i64, i32> = HashMap::new();
                    for msg in page {
                        if let Some(tg_id) = msg.sender_id {
                            if !sender_ids.contains_key(&tg_id) {
                                let user_id = store::users::upsert_stub(conn, tg_id).await?;
                                sender_ids.insert(tg_id, user_id);
                            }
                        }
                    }

                    let rows: Vec<_> = page
                        .iter()
                        .map(|msg| {
                            let user_id =
                                msg.sender_id.and_then(|tg| sender_ids.get(&tg).copied());
                            normalize_message(dialog_id, user_id, msg)
                        })
                        .collect();
                    let inserted = store::messages::insert_batch(conn, &rows).await?;

                    // Map upstream ids back to page entries for media and
                    // detections of the rows that were actually new.
                    let by_tg_id: HashMap<i64, (usize, &RpcMessage)> = page
                        .iter()
                        .enumerate()
                        .map(|(idx, msg)| (msg.id, (idx, msg)))
                        .collect();

                    let mut detections = Vec::new();
                    for (message_id, telegram_message_id) in &inserted {
                        if let Some((idx, msg)) = by_tg_id.get(telegram_message_id) {
                            if let Some(media) =
                                media_row(dialog_id, *message_id, msg, BACKFILL_MEDIA_PRIORITY)
                            {
                                if dialog.download_media {
                                    if let Some(media_file_id) =
                                        store::media::insert(conn, &media).await?
                                    {
                                        media_jobs.push(MediaJob {
                                            media_file_id,
                                            account_id,
                                            live: false,
                                        });
                                    }
                                }
                            }
                            detections.extend(detection_rows(*message_id, &candidates[*idx]));
                        }
                    }
                    if !detections.is_empty() {
                        store::detections::insert_batch(conn, &detections).await?;
                    }

                    if !inserted.is_empty() {
                        store::dialogs::bump_messages_count(conn, dialog_id, inserted.len() as i64)
                            .await?;
                        store::accounts::bump_messages_collected(
                            conn,
                            account_id,
                            inserted.len() as i64,
                        )
                        .await?;
                    }

                    // Cursor moves in the same transaction as the page.
                    store::dialogs::set_backfill_cursor(conn, dialog_id, Some(new_cursor)).await?;

                    Ok(inserted.len())
                }
                .scope_boxed()
            })
            .await;

            match result {
                Ok(count) => break count,
                Err(e)
                    if store::is_serialization_error(&e)
                        && attempt < store::SERIALIZATION_RETRIES =>
                {
                    warn!(dialog_id, attempt, "Serialization conflict on page, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        };

        drop(conn);
        for job in media_jobs {
            if self.media_tx.send(job).await.is_err() {
                warn!(dialog_id, "Media queue closed during backfill");
                break;
            }
        }

        Ok(inserted_count)
    }

    async fn finish(
        &self,
        dialog_id: i32,
        dialog_telegram_id: i64,
        cursor: i64,
        pages_done: u64,
        messages_saved: u64,
    ) {
        if let Ok(mut conn) = self.db.get_connection().await {
            // Only a still-backfilling dialog flips back to active; a pause
            // that landed meanwhile stays in force.
            match store::dialogs::get(&mut conn, dialog_id).await {
                Ok(Some(current)) if current.status == dialog_status::BACKFILLING => {
                    if let Err(e) =
                        store::dialogs::set_status(&mut conn, dialog_id, dialog_status::ACTIVE)
                            .await
                    {
                        error!(dialog_id, error = %e, "Failed to restore dialog status");
                    }
                }
                _ => {}
            }
        }
        self.bus
            .publish(DomainEvent::BackfillProgress {
                dialog_id,
                dialog_telegram_id,
                cursor,
                pages_done,
                messages_saved,
                finished: true,
            })
            .await;
    }

    async fn fail(&self, dialog_id: i32, message: &str) {
        if let Ok(mut conn) = self.db.get_connection().await {
            if let Err(e) = store::dialogs::set_error(&mut conn, dialog_id, message).await {
                error!(dialog_id, error = %e, "Failed to record dialog error");
            }
        }
    }
}
