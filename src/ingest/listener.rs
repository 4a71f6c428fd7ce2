// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Live listener.
//!
//! Runs inside each session actor: every message event for a monitored
//! dialog is normalized and committed in a single transaction together with
//! its media row and detections. Events are published only after the commit,
//! and the media descriptor is handed to the download pipeline afterwards.

use async_trait::async_trait;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncConnection;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::db::Database;
use crate::extract::{DetectionCandidate, Extractor};
use crate::ingest::{detection_rows, media_row, normalize_message};
use crate::media::MediaJob;
use crate::models::dialog::Dialog;
use crate::models::membership::NewMembership;
use crate::store;
use crate::store::messages::UpsertOutcome;
use crate::telegram::rpc::{LiveEvent, RpcMessage, RpcUser};
use crate::telegram::session::LiveEventHandler;

/// Priority stored on media rows captured live.
const LIVE_MEDIA_PRIORITY: i32 = 1;

pub struct LiveIngestor {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    extractor: Arc<Extractor>,
    media_tx: mpsc::Sender<MediaJob>,
}

impl LiveIngestor {
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        extractor: Arc<Extractor>,
        media_tx: mpsc::Sender<MediaJob>,
    ) -> Self {
        Self {
            db,
            bus,
            extractor,
            media_tx,
        }
    }

    /// Look up the dialog and check it is monitored by this account.
    async fn monitored_dialog(&self, account_id: i32, dialog_tg_id: i64) -> Option<Dialog> {
        let mut conn = match self.db.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "No connection for live event");
                return None;
            }
        };
        match store::dialogs::get_by_telegram_id(&mut conn, dialog_tg_id).await {
            Ok(Some(dialog)) if dialog.is_monitored() && dialog.account_id == Some(account_id) => {
                Some(dialog)
            }
            Ok(_) => {
                debug!(dialog_tg_id, "Event for unmonitored dialog ignored");
                None
            }
            Err(e) => {
                error!(dialog_tg_id, error = %e, "Dialog lookup failed");
                None
            }
        }
    }

    async fn ingest_message(&self, account_id: i32, msg: &RpcMessage) {
        let dialog = match self.monitored_dialog(account_id, msg.dialog_id).await {
            Some(dialog) => dialog,
            None => return,
        };

        let mut conn = match self.db.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "No connection for message ingest");
                return;
            }
        };

        let detectors = match store::detections::active_detectors(&mut conn).await {
            Ok(detectors) => detectors,
            Err(e) => {
                error!(error = %e, "Failed to load detectors");
                Vec::new()
            }
        };
        let candidates: Vec<DetectionCandidate> = msg
            .text
            .as_deref()
            .map(|text| self.extractor.scan(&detectors, text))
            .unwrap_or_default();

        let dialog_id = dialog.id;
        let sender_tg_id = msg.sender_id;

        // Serialization conflicts retry; any other error drops the event and
        // the unique key makes a later replay safe.
        let mut attempt = 0;
        let committed = loop {
            attempt += 1;
            let result = conn
                .transaction::<Option<(i64, Option<i32>)>, diesel::result::Error, _>(|conn| {
                    let candidates = &candidates;
                    async move {
                        let user_id = match sender_tg_id {
                            Some(tg_id) => Some(store::users::upsert_stub(conn, tg_id).await?),
                            None => None,
                        };

                        let row = normalize_message(dialog_id, user_id, msg);
                        let outcome = store::messages::upsert(conn, &row).await?;
                        let message_id = match outcome {
                            UpsertOutcome::Inserted(id) => id,
                            // Late or duplicate event: discarded idempotently.
                            UpsertOutcome::Existed => return Ok(None),
                        };

                        let media_file_id = match media_row(
                            dialog_id,
                            message_id,
                            msg,
                            LIVE_MEDIA_PRIORITY,
                        ) {
                            Some(media) => store::media::insert(conn, &media).await?,
                            None => None,
                        };

                        let detections = detection_rows(message_id, candidates);
                        if !detections.is_empty() {
                            store::detections::insert_batch(conn, &detections).await?;
                        }

                        store::dialogs::advance_last_message_id(conn, dialog_id, msg.id).await?;
                        store::dialogs::bump_messages_count(conn, dialog_id, 1).await?;
                        if let Some(user_id) = user_id {
                            store::users::bump_messages_count(conn, user_id, 1).await?;
                        }
                        store::accounts::bump_messages_collected(conn, account_id, 1).await?;

                        Ok(Some((message_id, media_file_id)))
                    }
                    .scope_boxed()
                })
                .await;

            match result {
                Ok(committed) => break committed,
                Err(e) if store::is_serialization_error(&e)
                    && attempt < store::SERIALIZATION_RETRIES =>
                {
                    warn!(attempt, "Serialization conflict on message ingest, retrying");
                }
                Err(e) => {
                    error!(
                        dialog_id,
                        telegram_message_id = msg.id,
                        error = %e,
                        "Message ingest failed"
                    );
                    return;
                }
            }
        };

        let (message_id, media_file_id) = match committed {
            Some(ids) => ids,
            None => return,
        };

        // Emission follows commit.
        self.bus
            .publish(DomainEvent::NewMessage {
                dialog_id,
                dialog_telegram_id: dialog.telegram_id,
                message_id,
                telegram_message_id: msg.id,
                text: msg.text.clone(),
                has_media: msg.media.is_some(),
            })
            .await;
        for candidate in &candidates {
            self.bus
                .publish(DomainEvent::NewDetection {
                    dialog_id,
                    message_id,
                    detector_name: candidate.detector_name.clone(),
                    detection_type: candidate.detection_type.clone(),
                    matched_text: candidate.matched_text.clone(),
                    normalized_value: candidate.normalized_value.clone(),
                })
                .await;
        }

        // Detected invite links queue up for the autojoiner.
        for candidate in &candidates {
            if candidate.detection_type != "invite_link" {
                continue;
            }
            if let Some(hash) = crate::extract::invite_hash(&candidate.matched_text) {
                if let Ok(mut conn) = self.db.get_connection().await {
                    let invite = crate::models::invite::NewInvite {
                        link: candidate.matched_text.trim().to_string(),
                        invite_hash: hash,
                        status: crate::models::invite::status::PENDING.to_string(),
                        source_dialog_id: Some(dialog_id),
                        source_user_id: None,
                    };
                    if let Err(e) = store::invites::create(&mut conn, &invite).await {
                        warn!(error = %e, "Could not queue detected invite");
                    }
                }
            }
        }

        if let Some(media_file_id) = media_file_id {
            if dialog.download_media {
                if let Err(e) = self
                    .media_tx
                    .send(MediaJob {
                        media_file_id,
                        account_id,
                        live: true,
                    })
                    .await
                {
                    warn!(media_file_id, error = %e, "Media queue closed");
                }
            }
        }
    }

    async fn refresh_edited(&self, account_id: i32, msg: &RpcMessage) {
        let dialog = match self.monitored_dialog(account_id, msg.dialog_id).await {
            Some(dialog) => dialog,
            None => return,
        };
        let mut conn = match self.db.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        let reactions = if msg.reactions.is_empty() {
            None
        } else {
            serde_json::to_value(&msg.reactions).ok()
        };
        if let Err(e) = store::messages::refresh_mutable(
            &mut conn,
            dialog.id,
            msg.id,
            msg.text.as_deref(),
            msg.views,
            msg.forwards,
            reactions,
        )
        .await
        {
            error!(dialog_id = dialog.id, error = %e, "Edit refresh failed");
        }
    }

    async fn participant_update(&self, account_id: i32, dialog_tg_id: i64, user: &RpcUser) {
        let dialog = match self.monitored_dialog(account_id, dialog_tg_id).await {
            Some(dialog) => dialog,
            None => return,
        };
        let mut conn = match self.db.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        let row = crate::ingest::user_row(user);
        match store::users::upsert_full(&mut conn, &row).await {
            Ok(user_id) => {
                let membership = NewMembership {
                    user_id,
                    dialog_id: dialog.id,
                    joined_at: None,
                    is_admin: false,
                    admin_title: None,
                    is_active: true,
                };
                if let Err(e) = store::users::upsert_membership(&mut conn, &membership).await {
                    error!(error = %e, "Membership upsert failed");
                }
            }
            Err(e) => error!(error = %e, "Participant upsert failed"),
        }
    }
}

#[async_trait]
impl LiveEventHandler for LiveIngestor {
    async fn handle(&self, account_id: i32, event: LiveEvent) {
        match event {
            LiveEvent::NewMessage(msg) => self.ingest_message(account_id, &msg).await,
            LiveEvent::MessageEdited(msg) => self.refresh_edited(account_id, &msg).await,
            LiveEvent::MessagesDeleted {
                dialog_id,
                message_ids,
            } => {
                // Deletion is observed but never applied to the corpus.
                info!(
                    dialog_tg_id = dialog_id,
                    count = message_ids.len(),
                    "Messages deleted upstream, corpus retained"
                );
            }
            LiveEvent::ParticipantUpdate { dialog_id, user } => {
                self.participant_update(account_id, dialog_id, &user).await
            }
        }
    }
}
