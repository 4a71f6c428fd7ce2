// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Retry service: re-enqueues failed and stranded downloads on a cadence.
//!
//! Rows that exhausted their attempts stay failed until user action.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MediaConfig;
use crate::db::Database;
use crate::media::MediaJob;
use crate::store;

pub struct MediaRetryService {
    db: Arc<Database>,
    media_tx: mpsc::Sender<MediaJob>,
    config: MediaConfig,
}

impl MediaRetryService {
    pub fn new(db: Arc<Database>, media_tx: mpsc::Sender<MediaJob>, config: MediaConfig) -> Self {
        Self {
            db,
            media_tx,
            config,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.retry_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.retry_interval.as_secs(),
            "Media retry service started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "Media retry scan failed");
            }
        }
        info!("Media retry service stopped");
    }

    /// One scan: pick retryable rows, re-queue them with their owning
    /// account.
    pub async fn scan_once(&self) -> anyhow::Result<usize> {
        let mut conn = self.db.get_connection().await?;
        let candidates = store::media::retry_candidates(
            &mut conn,
            self.config.retry_max_attempts,
            self.config.retry_batch_size,
        )
        .await?;

        let mut requeued = 0;
        for media in candidates {
            let dialog = match store::dialogs::get(&mut conn, media.dialog_id).await? {
                Some(dialog) => dialog,
                None => continue,
            };
            let account_id = match dialog.account_id {
                Some(account_id) => account_id,
                // Unassigned dialogs have no session to download through.
                None => continue,
            };

            store::media::set_queued(&mut conn, media.id).await?;
            if self
                .media_tx
                .send(MediaJob {
                    media_file_id: media.id,
                    account_id,
                    live: false,
                })
                .await
                .is_err()
            {
                break;
            }
            requeued += 1;
        }

        if requeued > 0 {
            debug!(requeued, "Re-enqueued media downloads");
        }
        Ok(requeued)
    }
}
