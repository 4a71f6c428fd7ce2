// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Member scraper: periodically lists participants of active groups and
//! supergroups, upserting users and memberships. Broadcast channels are
//! skipped, the upstream API forbids listing their members.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::models::membership::NewMembership;
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::retry::RetryPolicy;
use crate::telegram::rpc::RpcParticipant;

pub struct MemberScraper {
    db: Arc<Database>,
    manager: Arc<SessionManager>,
    retry: RetryPolicy,
    batch_size: i64,
    interval_hours: i64,
}

impl MemberScraper {
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
            interval_hours: (config.enrichment.member_scrape_interval.as_secs() / 3600).max(1)
                as i64,
        }
    }

    /// One pass over the dialogs due for a scrape. Returns how many dialogs
    /// were scraped.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now().naive_utc() - ChronoDuration::hours(self.interval_hours);
        let mut conn = self.db.get_connection().await?;
        let due = store::dialogs::due_for_member_scrape(&mut conn, cutoff, self.batch_size).await?;
        drop(conn);

        let mut scraped = 0;
        for dialog in due {
            if !dialog.supports_member_scrape() {
                continue;
            }
            let account_id = match dialog.account_id {
                Some(account_id) => account_id,
                None => continue,
            };
            let handle = match self.manager.session(account_id).await {
                Some(handle) => handle,
                None => {
                    warn!(dialog_id = dialog.id, account_id, "No session for member scrape");
                    continue;
                }
            };

            let telegram_id = dialog.telegram_id;
            let outcome = self
                .retry
                .run("participants", || {
                    let handle = handle.clone();
                    async move { handle.participants(telegram_id).await }
                })
                .await;

            let participants = match outcome.result {
                Ok(participants) => participants,
                Err(e) => {
                    warn!(dialog_id = dialog.id, error = %e, "Member scrape failed");
                    continue;
                }
            };

            match self.persist(dialog.id, &participants).await {
                Ok(count) => {
                    info!(dialog_id = dialog.id, members = count, "Members scraped");
                    scraped += 1;
                }
                Err(e) => warn!(dialog_id = dialog.id, error = %e, "Member persist failed"),
            }
        }
        Ok(scraped)
    }

    async fn persist(
        &self,
        dialog_id: i32,
        participants: &[RpcParticipant],
    ) -> anyhow::Result<usize> {
        let mut conn = self.db.get_connection().await?;
        let mut seen_ids = Vec::with_capacity(participants.len());

        for participant in participants {
            let row = crate::ingest::user_row(&participant.user);
            let user_id = store::users::upsert_full(&mut conn, &row).await?;
            seen_ids.push(user_id);

            let membership = NewMembership {
                user_id,
                dialog_id,
                joined_at: participant.joined_at.map(|t| t.naive_utc()),
                is_admin: participant.is_admin,
                admin_title: participant.admin_title.clone(),
                is_active: true,
            };
            store::users::upsert_membership(&mut conn, &membership).await?;
        }

        store::users::deactivate_missing_members(&mut conn, dialog_id, &seen_ids, "left").await?;
        store::dialogs::mark_member_scraped(&mut conn, dialog_id).await?;
        Ok(seen_ids.len())
    }
}
