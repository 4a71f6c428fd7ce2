// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Invite resolver and autojoiner.
//!
//! Resolution fills invite previews through a session at interactive
//! priority. Joining picks an account per policy (rotation over the
//! least-recently-joined enabled account, or a specific one), honors the
//! per-account daily cap and the spacing between joins, and runs the
//! configured post-join actions. The background worker drains pending
//! invites when autojoin is enabled.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::extract::invite_hash;
use crate::ingest::backfill::BackfillCoordinator;
use crate::models::dialog::{status as dialog_status, NewDialog};
use crate::models::invite::{status as invite_status, Invite, NewInvite};
use crate::registry::DialogRegistry;
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::retry::RetryPolicy;
use crate::telegram::rpc::{JoinOutcome, RpcDialog, RpcError};

const SETTINGS_KEY: &str = "autojoin";

/// Runtime autojoin settings, persisted in the settings table. Env defaults
/// apply for fields the row does not carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutojoinSettings {
    /// Whether the background worker joins pending invites.
    #[serde(default)]
    pub enabled: bool,
    /// "rotation" or "specific".
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Account used when mode is "specific".
    #[serde(default)]
    pub specific_account_id: Option<i32>,
    /// Accounts eligible for rotation; empty means all connected accounts.
    #[serde(default)]
    pub enabled_accounts: Vec<i32>,
    #[serde(default = "default_true")]
    pub auto_monitor: bool,
    #[serde(default = "default_true")]
    pub auto_backfill: bool,
    #[serde(default = "default_true")]
    pub auto_scrape_members: bool,
    /// Overrides for the env defaults, in the same units.
    #[serde(default)]
    pub max_joins_per_day: Option<i64>,
    #[serde(default)]
    pub delay_seconds: Option<u64>,
}

fn default_mode() -> String {
    "rotation".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AutojoinSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_mode(),
            specific_account_id: None,
            enabled_accounts: Vec::new(),
            auto_monitor: true,
            auto_backfill: true,
            auto_scrape_members: true,
            max_joins_per_day: None,
            delay_seconds: None,
        }
    }
}

pub struct AutoJoiner {
    db: Arc<Database>,
    manager: Arc<SessionManager>,
    registry: Arc<DialogRegistry>,
    backfill: Arc<BackfillCoordinator>,
    retry: RetryPolicy,
    config: Config,
}

impl AutoJoiner {
    pub fn new(
        db: Arc<Database>,
        manager: Arc<SessionManager>,
        registry: Arc<DialogRegistry>,
        backfill: Arc<BackfillCoordinator>,
        config: Config,
    ) -> Self {
        Self {
            db,
            manager,
            registry,
            backfill,
            retry: RetryPolicy::new(
                config.telegram.retry_max_attempts,
                config.telegram.retry_delay_base,
                config.telegram.retry_jitter,
            ),
            config,
        }
    }

    async fn conn(&self) -> EngineResult<crate::db::DbConnection> {
        self.db
            .get_connection()
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub async fn settings(&self) -> EngineResult<AutojoinSettings> {
        let mut conn = self.conn().await?;
        let value = store::settings::get(&mut conn, SETTINGS_KEY)
            .await
            .map_err(EngineError::from)?;
        Ok(value
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    pub async fn update_settings(&self, settings: &AutojoinSettings) -> EngineResult<()> {
        let mut conn = self.conn().await?;
        let value = serde_json::to_value(settings)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        store::settings::set(&mut conn, SETTINGS_KEY, &value)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    fn max_per_day(&self, settings: &AutojoinSettings) -> i64 {
        settings
            .max_joins_per_day
            .unwrap_or(self.config.autojoin.max_per_day)
            .max(1)
    }

    fn join_delay_secs(&self, settings: &AutojoinSettings) -> i64 {
        settings
            .delay_seconds
            .map(|s| s as i64)
            .unwrap_or(self.config.autojoin.delay.as_secs() as i64)
    }

    /// Register a link for later processing.
    pub async fn create(
        &self,
        link: &str,
        source_dialog_id: Option<i32>,
        source_user_id: Option<i32>,
    ) -> EngineResult<Invite> {
        let hash = invite_hash(link).ok_or_else(|| {
            EngineError::InvalidRequest(format!("not an invite link: {}", link))
        })?;
        let mut conn = self.conn().await?;
        store::invites::create(
            &mut conn,
            &NewInvite {
                link: link.trim().to_string(),
                invite_hash: hash,
                status: invite_status::PENDING.to_string(),
                source_dialog_id,
                source_user_id,
            },
        )
        .await
        .map_err(EngineError::from)
    }

    /// Resolve the invite preview through a session.
    pub async fn resolve(&self, invite_id: i32, account_id: Option<i32>) -> EngineResult<Invite> {
        let mut conn = self.conn().await?;
        let invite = store::invites::get(&mut conn, invite_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("invite {}", invite_id)))?;
        drop(conn);

        let handle = match account_id {
            Some(account_id) => self.manager.require_session(account_id).await?,
            None => self
                .manager
                .any_session()
                .await
                .ok_or_else(|| EngineError::InvalidRequest("no connected account".into()))?,
        };

        let hash = invite.invite_hash.clone();
        let outcome = self
            .retry
            .run("resolve_invite", || {
                let handle = handle.clone();
                let hash = hash.clone();
                async move { handle.resolve_invite(&hash).await }
            })
            .await;

        let mut conn = self.conn().await?;
        match outcome.result {
            Ok(preview) => {
                store::invites::update_preview(&mut conn, invite.id, &preview)
                    .await
                    .map_err(EngineError::from)?;
            }
            Err(RpcError::NotFound(_)) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::INVALID,
                    Some("invite not found"),
                )
                .await
                .map_err(EngineError::from)?;
            }
            Err(RpcError::PermissionDenied(_)) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::PRIVATE,
                    Some("invite is private"),
                )
                .await
                .map_err(EngineError::from)?;
            }
            Err(e) => {
                store::invites::bump_retry(&mut conn, invite.id)
                    .await
                    .map_err(EngineError::from)?;
                return Err(e.into());
            }
        }

        store::invites::get(&mut conn, invite.id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("invite {}", invite_id)))
    }

    /// Pick the joining account per policy; errors are rate limits with the
    /// seconds until the next join is allowed.
    async fn choose_account(&self, settings: &AutojoinSettings) -> EngineResult<i32> {
        let candidates: Vec<i32> = if settings.mode == "specific" {
            settings
                .specific_account_id
                .into_iter()
                .collect()
        } else if settings.enabled_accounts.is_empty() {
            self.manager
                .status_snapshot()
                .await
                .into_iter()
                .map(|(id, _, _)| id)
                .collect()
        } else {
            settings.enabled_accounts.clone()
        };
        if candidates.is_empty() {
            return Err(EngineError::InvalidRequest(
                "no accounts enabled for autojoin".into(),
            ));
        }

        let max_per_day = self.max_per_day(settings);
        let delay_secs = self.join_delay_secs(settings);
        let now = Utc::now().naive_utc();

        let mut conn = self.conn().await?;
        let mut eligible: Vec<(i32, Option<chrono::NaiveDateTime>)> = Vec::new();
        let mut min_wait: Option<i64> = None;

        for account_id in candidates {
            if self.manager.session(account_id).await.is_none() {
                continue;
            }
            let joins = store::invites::joins_in_last_day(&mut conn, account_id)
                .await
                .map_err(EngineError::from)?;
            let last_join = store::invites::last_join_at(&mut conn, account_id)
                .await
                .map_err(EngineError::from)?;

            if joins >= max_per_day {
                // Capped; it frees up 24h after its oldest counted join,
                // approximated from the most recent one.
                let wait = last_join
                    .map(|t| (t + chrono::Duration::hours(24) - now).num_seconds().max(1))
                    .unwrap_or(3600);
                min_wait = Some(min_wait.map_or(wait, |w: i64| w.min(wait)));
                continue;
            }
            if let Some(last) = last_join {
                let since = (now - last).num_seconds();
                if since < delay_secs {
                    let wait = delay_secs - since;
                    min_wait = Some(min_wait.map_or(wait, |w: i64| w.min(wait)));
                    continue;
                }
            }
            eligible.push((account_id, last_join));
        }

        if eligible.is_empty() {
            let seconds = min_wait.unwrap_or(60).max(1) as u32;
            return Err(EngineError::RateLimit { seconds });
        }

        // Rotation: least recently joined first; never-joined wins ties.
        eligible.sort_by_key(|(id, last)| (*last, *id));
        Ok(eligible[0].0)
    }

    /// Join an invite now, bypassing the background cadence but not the
    /// account policy.
    pub async fn join_now(&self, invite_id: i32) -> EngineResult<Invite> {
        let settings = self.settings().await?;
        let mut conn = self.conn().await?;
        let invite = store::invites::get(&mut conn, invite_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("invite {}", invite_id)))?;

        match invite.status.as_str() {
            invite_status::JOINED | invite_status::ALREADY_JOINED => return Ok(invite),
            invite_status::INVALID | invite_status::EXPIRED => {
                return Err(EngineError::InvalidRequest(format!(
                    "invite {} is {}",
                    invite_id, invite.status
                )))
            }
            _ => {}
        }

        let account_id = self.choose_account(&settings).await?;
        let handle = self.manager.require_session(account_id).await?;

        store::invites::set_status(&mut conn, invite.id, invite_status::PROCESSING, None)
            .await
            .map_err(EngineError::from)?;
        drop(conn);

        let result = handle.join_invite(&invite.invite_hash).await;

        let mut conn = self.conn().await?;
        match result {
            Ok(JoinOutcome::Joined(dialog)) => {
                self.after_join(&settings, &invite, account_id, &dialog, invite_status::JOINED)
                    .await?;
            }
            Ok(JoinOutcome::AlreadyJoined(dialog)) => {
                self.after_join(
                    &settings,
                    &invite,
                    account_id,
                    &dialog,
                    invite_status::ALREADY_JOINED,
                )
                .await?;
            }
            Ok(JoinOutcome::RequestPending) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::REQUEST_PENDING,
                    None,
                )
                .await
                .map_err(EngineError::from)?;
            }
            Ok(JoinOutcome::Invalid) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::INVALID,
                    Some("invite rejected as invalid"),
                )
                .await
                .map_err(EngineError::from)?;
            }
            Ok(JoinOutcome::Expired) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::EXPIRED,
                    Some("invite expired"),
                )
                .await
                .map_err(EngineError::from)?;
            }
            Err(RpcError::PermissionDenied(reason)) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::PRIVATE,
                    Some(&reason),
                )
                .await
                .map_err(EngineError::from)?;
            }
            Err(e) => {
                store::invites::set_status(
                    &mut conn,
                    invite.id,
                    invite_status::FAILED,
                    Some(&e.to_string()),
                )
                .await
                .map_err(EngineError::from)?;
                store::invites::bump_retry(&mut conn, invite.id)
                    .await
                    .map_err(EngineError::from)?;
                return Err(e.into());
            }
        }

        store::invites::get(&mut conn, invite.id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("invite {}", invite_id)))
    }

    /// Record the join and run the configured post-join actions.
    async fn after_join(
        &self,
        settings: &AutojoinSettings,
        invite: &Invite,
        account_id: i32,
        dialog: &RpcDialog,
        joined_status: &str,
    ) -> EngineResult<()> {
        let mut conn = self.conn().await?;
        let row = NewDialog {
            telegram_id: dialog.id,
            dialog_type: dialog.kind.clone(),
            title: dialog.title.clone(),
            username: dialog.username.clone(),
            member_count: dialog.member_count,
            account_id: Some(account_id),
            status: dialog_status::ACTIVE.to_string(),
            download_media: true,
            backfill_enabled: true,
            is_monitoring: settings.auto_monitor,
        };
        let stored = store::dialogs::upsert(&mut conn, &row)
            .await
            .map_err(EngineError::from)?;
        if stored.account_id.is_none() {
            store::dialogs::set_account(&mut conn, stored.id, Some(account_id))
                .await
                .map_err(EngineError::from)?;
        }

        store::invites::mark_joined(&mut conn, invite.id, joined_status, account_id, stored.id)
            .await
            .map_err(EngineError::from)?;
        drop(conn);

        info!(
            invite_id = invite.id,
            account_id,
            dialog_id = stored.id,
            status = joined_status,
            "Invite joined"
        );

        if settings.auto_monitor {
            if let Err(e) = self.registry.assign(stored.id, account_id, true).await {
                warn!(dialog_id = stored.id, error = %e, "Post-join assign failed");
            }
        }
        if settings.auto_backfill && stored.backfill_enabled {
            if let Err(e) = self.backfill.clone().start(stored.id).await {
                warn!(dialog_id = stored.id, error = %e, "Post-join backfill failed");
            }
        }
        if settings.auto_scrape_members {
            let mut conn = self.conn().await?;
            if let Err(e) = store::dialogs::clear_member_scraped(&mut conn, stored.id).await {
                warn!(dialog_id = stored.id, error = %e, "Post-join scrape scheduling failed");
            }
        }
        Ok(())
    }

    /// Background worker: joins pending invites while enabled, spacing
    /// joins by the configured delay.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Autojoin worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let settings = match self.settings().await {
                Ok(settings) => settings,
                Err(e) => {
                    error!(error = %e, "Autojoin settings unavailable");
                    continue;
                }
            };
            if !settings.enabled {
                continue;
            }

            let next = {
                let mut conn = match self.db.get_connection().await {
                    Ok(conn) => conn,
                    Err(_) => continue,
                };
                store::invites::next_pending(&mut conn).await.ok().flatten()
            };
            let invite = match next {
                Some(invite) => invite,
                None => continue,
            };

            match self.join_now(invite.id).await {
                Ok(joined) => {
                    info!(invite_id = joined.id, status = %joined.status, "Autojoin processed");
                }
                Err(EngineError::RateLimit { seconds }) => {
                    info!(invite_id = invite.id, seconds, "Autojoin paced by rate limit");
                }
                Err(e) => {
                    warn!(invite_id = invite.id, error = %e, "Autojoin failed");
                }
            }
        }
        info!("Autojoin worker stopped");
    }
}
