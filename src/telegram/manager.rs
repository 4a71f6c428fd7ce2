// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Session manager: one actor per account, spawned on demand and restored
//! for authorized accounts at boot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::config::TelegramConfig;
use crate::db::Database;
use crate::error::{EngineError, EngineResult};
use crate::models::account::Account;
use crate::store;
use crate::telegram::rpc::{ConnectOutcome, RpcError, RpcFactory, RpcUser, SignInOutcome};
use crate::telegram::session::{LiveEventHandler, SessionActor, SessionHandle};

pub struct SessionManager {
    db: Arc<Database>,
    bus: Arc<EventBus>,
    config: TelegramConfig,
    factory: Arc<dyn RpcFactory>,
    live_handler: Arc<dyn LiveEventHandler>,
    sessions: Mutex<HashMap<i32, SessionHandle>>,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(
        db: Arc<Database>,
        bus: Arc<EventBus>,
        config: TelegramConfig,
        factory: Arc<dyn RpcFactory>,
        live_handler: Arc<dyn LiveEventHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            bus,
            config,
            factory,
            live_handler,
            sessions: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    fn session_path(&self, account_id: i32) -> PathBuf {
        self.config
            .session_root
            .join(format!("{}.session", account_id))
    }

    /// Handle for a running session, if any.
    pub async fn session(&self, account_id: i32) -> Option<SessionHandle> {
        self.sessions.lock().await.get(&account_id).cloned()
    }

    /// Any running session; enrichment scans that are not tied to a dialog
    /// owner go through whichever account is available.
    pub async fn any_session(&self) -> Option<SessionHandle> {
        let sessions = self.sessions.lock().await;
        let mut ids: Vec<i32> = sessions.keys().copied().collect();
        ids.sort_unstable();
        ids.first().and_then(|id| sessions.get(id).cloned())
    }

    /// Handle for a running session, as a command-API error when absent.
    pub async fn require_session(&self, account_id: i32) -> EngineResult<SessionHandle> {
        self.session(account_id).await.ok_or_else(|| {
            EngineError::InvalidRequest(format!("account {} is not connected", account_id))
        })
    }

    /// Spawn (or reuse) the actor for an account.
    pub async fn ensure_session(&self, account: &Account) -> Result<SessionHandle, RpcError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(&account.id) {
            return Ok(handle.clone());
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.session_root).await {
            return Err(RpcError::Temporary(format!(
                "cannot create session root: {}",
                e
            )));
        }

        let rpc = self
            .factory
            .create(account, &self.session_path(account.id))
            .await?;

        let handle = SessionActor::spawn(
            account.id,
            account.status.clone(),
            rpc,
            self.db.clone(),
            self.bus.clone(),
            self.live_handler.clone(),
            &self.config,
            self.cancel.child_token(),
        );
        sessions.insert(account.id, handle.clone());
        info!(account_id = account.id, "Session spawned");
        Ok(handle)
    }

    /// Connect an account: spawns the session and drives the auth handshake
    /// one step.
    pub async fn connect(&self, account_id: i32) -> EngineResult<ConnectOutcome> {
        let account = self.load_account(account_id).await?;
        let handle = self.ensure_session(&account).await.map_err(EngineError::from)?;
        handle.connect().await.map_err(EngineError::from)
    }

    pub async fn submit_code(&self, account_id: i32, code: &str) -> EngineResult<SignInOutcome> {
        let handle = self.require_session(account_id).await?;
        handle.submit_code(code).await.map_err(EngineError::from)
    }

    pub async fn submit_password(
        &self,
        account_id: i32,
        password: &str,
    ) -> EngineResult<RpcUser> {
        let handle = self.require_session(account_id).await?;
        handle
            .submit_password(password)
            .await
            .map_err(EngineError::from)
    }

    pub async fn disconnect(&self, account_id: i32) -> EngineResult<()> {
        let handle = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&account_id)
        };
        match handle {
            Some(handle) => handle.disconnect().await.map_err(EngineError::from),
            None => Ok(()),
        }
    }

    /// Respawn sessions for every account that was authorized when the
    /// process last ran.
    pub async fn restore_active_sessions(&self) -> anyhow::Result<usize> {
        let mut conn = self.db.get_connection().await?;
        let accounts = store::accounts::active(&mut conn).await?;
        drop(conn);

        let mut restored = 0;
        for account in &accounts {
            match self.ensure_session(account).await {
                Ok(handle) => {
                    // Reconnect with the persisted session blob; an expired
                    // blob degrades to code_required and waits for the user.
                    if let Err(e) = handle.connect().await {
                        warn!(account_id = account.id, error = %e, "Session restore failed");
                    } else {
                        restored += 1;
                    }
                }
                Err(e) => {
                    warn!(account_id = account.id, error = %e, "Could not spawn session");
                }
            }
        }
        info!(restored, total = accounts.len(), "Restored sessions");
        Ok(restored)
    }

    /// Session status snapshot for the command API.
    pub async fn status_snapshot(&self) -> Vec<(i32, String, u64)> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .map(|h| (h.account_id, h.status(), h.dropped_events()))
            .collect()
    }

    async fn load_account(&self, account_id: i32) -> EngineResult<Account> {
        let mut conn = self
            .db
            .get_connection()
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        store::accounts::get(&mut conn, account_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(format!("account {}", account_id)))
    }
}
