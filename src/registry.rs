// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Dialog registry: the authoritative dialog → owning-account mapping with
//! its status transitions. Backed by the dialogs table; a dialog has at most
//! one owner and reassignment is an explicit command.

use std::sync::Arc;
use tracing::info;

use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::models::dialog::{status, Dialog, DialogOptions, NewDialog};
use crate::store;
use crate::telegram::rpc::RpcDialog;

pub struct DialogRegistry {
    db: Arc<Database>,
}

impl DialogRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn conn(&self) -> EngineResult<crate::db::DbConnection> {
        self.db
            .get_connection()
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub async fn get(&self, dialog_id: i32) -> EngineResult<Dialog> {
        let mut conn = self.conn().await?;
        store::dialogs::get(&mut conn, dialog_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("dialog {}", dialog_id)))
    }

    pub async fn list(&self, account_id: Option<i32>) -> EngineResult<Vec<Dialog>> {
        let mut conn = self.conn().await?;
        store::dialogs::list(&mut conn, account_id)
            .await
            .map_err(EngineError::from)
    }

    /// Register upstream dialogs under an owning account and start
    /// monitoring them.
    pub async fn add_dialogs(
        &self,
        account_id: i32,
        dialogs: &[RpcDialog],
        download_media: bool,
        backfill_enabled: bool,
    ) -> EngineResult<Vec<Dialog>> {
        let mut conn = self.conn().await?;
        let mut added = Vec::with_capacity(dialogs.len());
        for dialog in dialogs {
            let row = NewDialog {
                telegram_id: dialog.id,
                dialog_type: dialog.kind.clone(),
                title: dialog.title.clone(),
                username: dialog.username.clone(),
                member_count: dialog.member_count,
                account_id: Some(account_id),
                status: status::ACTIVE.to_string(),
                download_media,
                backfill_enabled,
                is_monitoring: true,
            };
            let stored = store::dialogs::upsert(&mut conn, &row)
                .await
                .map_err(EngineError::from)?;
            // A dialog someone else already owns stays with its owner;
            // taking it over is the explicit reassign command.
            if stored.account_id.is_none() {
                store::dialogs::set_account(&mut conn, stored.id, Some(account_id))
                    .await
                    .map_err(EngineError::from)?;
            }
            if stored.status == status::INACTIVE {
                store::dialogs::set_status(&mut conn, stored.id, status::ACTIVE)
                    .await
                    .map_err(EngineError::from)?;
                store::dialogs::set_monitoring(&mut conn, stored.id, true)
                    .await
                    .map_err(EngineError::from)?;
            }
            let stored = store::dialogs::get(&mut conn, stored.id)
                .await
                .map_err(EngineError::from)?
                .ok_or_else(|| EngineError::NotFound(format!("dialog {}", stored.id)))?;
            added.push(stored);
        }
        info!(account_id, count = added.len(), "Dialogs added");
        Ok(added)
    }

    /// Assign a dialog to an account. Reassignment must be explicit.
    pub async fn assign(
        &self,
        dialog_id: i32,
        account_id: i32,
        allow_reassign: bool,
    ) -> EngineResult<()> {
        let dialog = self.get(dialog_id).await?;
        match dialog.account_id {
            Some(owner) if owner != account_id && !allow_reassign => {
                return Err(EngineError::InvalidRequest(format!(
                    "dialog {} is owned by account {}; reassign explicitly",
                    dialog_id, owner
                )));
            }
            _ => {}
        }
        let mut conn = self.conn().await?;
        store::dialogs::set_account(&mut conn, dialog_id, Some(account_id))
            .await
            .map_err(EngineError::from)?;
        info!(dialog_id, account_id, "Dialog assigned");
        Ok(())
    }

    pub async fn unassign(&self, dialog_id: i32) -> EngineResult<()> {
        let mut conn = self.conn().await?;
        store::dialogs::set_account(&mut conn, dialog_id, None)
            .await
            .map_err(EngineError::from)?;
        store::dialogs::set_status(&mut conn, dialog_id, status::INACTIVE)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    /// Pause stops dispatching new work immediately; in-flight work runs to
    /// completion.
    pub async fn pause(&self, dialog_id: i32) -> EngineResult<()> {
        let dialog = self.get(dialog_id).await?;
        if dialog.status != status::ACTIVE && dialog.status != status::BACKFILLING {
            return Err(EngineError::InvalidRequest(format!(
                "dialog {} is not active (status {})",
                dialog_id, dialog.status
            )));
        }
        let mut conn = self.conn().await?;
        store::dialogs::set_status(&mut conn, dialog_id, status::PAUSED)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    pub async fn resume(&self, dialog_id: i32) -> EngineResult<()> {
        let dialog = self.get(dialog_id).await?;
        if dialog.status != status::PAUSED {
            return Err(EngineError::InvalidRequest(format!(
                "dialog {} is not paused (status {})",
                dialog_id, dialog.status
            )));
        }
        let mut conn = self.conn().await?;
        store::dialogs::set_status(&mut conn, dialog_id, status::ACTIVE)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    pub async fn toggle_monitoring(&self, dialog_id: i32) -> EngineResult<bool> {
        let dialog = self.get(dialog_id).await?;
        let next = !dialog.is_monitoring;
        let mut conn = self.conn().await?;
        store::dialogs::set_monitoring(&mut conn, dialog_id, next)
            .await
            .map_err(EngineError::from)?;
        Ok(next)
    }

    pub async fn set_options(
        &self,
        dialog_id: i32,
        options: &DialogOptions,
    ) -> EngineResult<Dialog> {
        // Touching a missing dialog must surface not_found, not a no-op.
        self.get(dialog_id).await?;
        if options.download_media.is_none()
            && options.ocr_enabled.is_none()
            && options.backfill_enabled.is_none()
            && options.is_monitoring.is_none()
        {
            return self.get(dialog_id).await;
        }
        let mut conn = self.conn().await?;
        store::dialogs::set_options(&mut conn, dialog_id, options)
            .await
            .map_err(EngineError::from)?;
        self.get(dialog_id).await
    }
}
