// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Per-account session actor.
//!
//! One actor owns the upstream connection of one account and is its only
//! caller. Work arrives on four bounded queues drained in strict priority
//! order: interactive (auth, joins, resolves) preempts, then live, backfill,
//! enrichment; FIFO within a class. Every upstream call pays the session's
//! rate budget; a server-advised FloodWait hard-pauses the actor until the
//! deadline. Live events from the connection are handled inline, so message
//! processing within one session stays ordered per dialog.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::config::TelegramConfig;
use crate::db::Database;
use crate::models::account::status;
use crate::store;
use crate::telegram::rate_limit::{RateBudget, RateLimitMode};
use crate::telegram::rpc::{
    ConnectOutcome, InvitePreview, JoinOutcome, LiveEvent, MediaPayload, RpcDialog, RpcError,
    RpcMessage, RpcParticipant, RpcProfilePhoto, RpcStory, RpcUser, SignInOutcome, TelegramRpc,
};

/// Queue depth per priority class.
const QUEUE_CAPACITY: usize = 256;

/// Priority classes for session work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Interactive,
    Live,
    Backfill,
    Enrichment,
}

/// Requests served by the session actor. Each carries a oneshot reply.
pub enum SessionRequest {
    Connect {
        reply: oneshot::Sender<Result<ConnectOutcome, RpcError>>,
    },
    SubmitCode {
        code: String,
        reply: oneshot::Sender<Result<SignInOutcome, RpcError>>,
    },
    SubmitPassword {
        password: String,
        reply: oneshot::Sender<Result<RpcUser, RpcError>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), RpcError>>,
    },
    ListDialogs {
        reply: oneshot::Sender<Result<Vec<RpcDialog>, RpcError>>,
    },
    HistoryPage {
        dialog_id: i64,
        offset_id: i64,
        page_size: usize,
        reply: oneshot::Sender<Result<Vec<RpcMessage>, RpcError>>,
    },
    DownloadMedia {
        dialog_id: i64,
        message_id: i64,
        reply: oneshot::Sender<Result<MediaPayload, RpcError>>,
    },
    GetEntity {
        user_id: i64,
        reply: oneshot::Sender<Result<RpcUser, RpcError>>,
    },
    Participants {
        dialog_id: i64,
        reply: oneshot::Sender<Result<Vec<RpcParticipant>, RpcError>>,
    },
    ProfilePhotos {
        user_id: i64,
        reply: oneshot::Sender<Result<Vec<RpcProfilePhoto>, RpcError>>,
    },
    DownloadProfilePhoto {
        user_id: i64,
        photo_id: i64,
        reply: oneshot::Sender<Result<MediaPayload, RpcError>>,
    },
    Stories {
        user_id: i64,
        reply: oneshot::Sender<Result<Vec<RpcStory>, RpcError>>,
    },
    DownloadStory {
        user_id: i64,
        story_id: i64,
        reply: oneshot::Sender<Result<MediaPayload, RpcError>>,
    },
    ResolveInvite {
        hash: String,
        reply: oneshot::Sender<Result<InvitePreview, RpcError>>,
    },
    JoinInvite {
        hash: String,
        reply: oneshot::Sender<Result<JoinOutcome, RpcError>>,
    },
}

/// Consumer of live events; implemented by the ingest listener.
#[async_trait]
pub trait LiveEventHandler: Send + Sync {
    async fn handle(&self, account_id: i32, event: LiveEvent);
}

/// Cheap handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub account_id: i32,
    interactive_tx: mpsc::Sender<SessionRequest>,
    live_tx: mpsc::Sender<SessionRequest>,
    backfill_tx: mpsc::Sender<SessionRequest>,
    enrichment_tx: mpsc::Sender<SessionRequest>,
    status_rx: watch::Receiver<String>,
    dropped_events: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn status(&self) -> String {
        self.status_rx.borrow().clone()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    async fn send(&self, priority: Priority, request: SessionRequest) -> Result<(), RpcError> {
        let queue = match priority {
            Priority::Interactive => &self.interactive_tx,
            Priority::Live => &self.live_tx,
            Priority::Backfill => &self.backfill_tx,
            Priority::Enrichment => &self.enrichment_tx,
        };
        queue
            .send(request)
            .await
            .map_err(|_| RpcError::Temporary("session actor stopped".into()))
    }

    async fn roundtrip<T>(
        &self,
        priority: Priority,
        build: impl FnOnce(oneshot::Sender<Result<T, RpcError>>) -> SessionRequest,
    ) -> Result<T, RpcError> {
        let (tx, rx) = oneshot::channel();
        self.send(priority, build(tx)).await?;
        rx.await
            .map_err(|_| RpcError::Temporary("session actor dropped the request".into()))?
    }

    pub async fn connect(&self) -> Result<ConnectOutcome, RpcError> {
        self.roundtrip(Priority::Interactive, |reply| SessionRequest::Connect { reply })
            .await
    }

    pub async fn submit_code(&self, code: &str) -> Result<SignInOutcome, RpcError> {
        let code = code.to_string();
        self.roundtrip(Priority::Interactive, move |reply| SessionRequest::SubmitCode {
            code,
            reply,
        })
        .await
    }

    pub async fn submit_password(&self, password: &str) -> Result<RpcUser, RpcError> {
        let password = password.to_string();
        self.roundtrip(Priority::Interactive, move |reply| {
            SessionRequest::SubmitPassword { password, reply }
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<(), RpcError> {
        self.roundtrip(Priority::Interactive, |reply| SessionRequest::Disconnect { reply })
            .await
    }

    pub async fn list_dialogs(&self) -> Result<Vec<RpcDialog>, RpcError> {
        self.roundtrip(Priority::Interactive, |reply| SessionRequest::ListDialogs { reply })
            .await
    }

    pub async fn history_page(
        &self,
        dialog_id: i64,
        offset_id: i64,
        page_size: usize,
    ) -> Result<Vec<RpcMessage>, RpcError> {
        self.roundtrip(Priority::Backfill, move |reply| SessionRequest::HistoryPage {
            dialog_id,
            offset_id,
            page_size,
            reply,
        })
        .await
    }

    pub async fn download_media(
        &self,
        priority: Priority,
        dialog_id: i64,
        message_id: i64,
    ) -> Result<MediaPayload, RpcError> {
        self.roundtrip(priority, move |reply| SessionRequest::DownloadMedia {
            dialog_id,
            message_id,
            reply,
        })
        .await
    }

    pub async fn get_entity(&self, user_id: i64) -> Result<RpcUser, RpcError> {
        self.roundtrip(Priority::Enrichment, move |reply| SessionRequest::GetEntity {
            user_id,
            reply,
        })
        .await
    }

    pub async fn participants(&self, dialog_id: i64) -> Result<Vec<RpcParticipant>, RpcError> {
        self.roundtrip(Priority::Enrichment, move |reply| SessionRequest::Participants {
            dialog_id,
            reply,
        })
        .await
    }

    pub async fn profile_photos(&self, user_id: i64) -> Result<Vec<RpcProfilePhoto>, RpcError> {
        self.roundtrip(Priority::Enrichment, move |reply| SessionRequest::ProfilePhotos {
            user_id,
            reply,
        })
        .await
    }

    pub async fn download_profile_photo(
        &self,
        user_id: i64,
        photo_id: i64,
    ) -> Result<MediaPayload, RpcError> {
        self.roundtrip(Priority::Enrichment, move |reply| {
            SessionRequest::DownloadProfilePhoto {
                user_id,
                photo_id,
                reply,
            }
        })
        .await
    }

    pub async fn stories(&self, user_id: i64) -> Result<Vec<RpcStory>, RpcError> {
        self.roundtrip(Priority::Enrichment, move |reply| SessionRequest::Stories {
            user_id,
            reply,
        })
        .await
    }

    pub async fn download_story(
        &self,
        user_id: i64,
        story_id: i64,
    ) -> Result<MediaPayload, RpcError> {
        self.roundtrip(Priority::Enrichment, move |reply| SessionRequest::DownloadStory {
            user_id,
            story_id,
            reply,
        })
        .await
    }

    pub async fn resolve_invite(&self, hash: &str) -> Result<InvitePreview, RpcError> {
        let hash = hash.to_string();
        self.roundtrip(Priority::Interactive, move |reply| SessionRequest::ResolveInvite {
            hash,
            reply,
        })
        .await
    }

    pub async fn join_invite(&self, hash: &str) -> Result<JoinOutcome, RpcError> {
        let hash = hash.to_string();
        self.roundtrip(Priority::Interactive, move |reply| SessionRequest::JoinInvite {
            hash,
            reply,
        })
        .await
    }
}

enum Next {
    Request(SessionRequest),
    Event(Result<LiveEvent, broadcast::error::RecvError>),
    Shutdown,
}

/// The actor task owning one upstream connection.
pub struct SessionActor {
    account_id: i32,
    rpc: Arc<dyn TelegramRpc>,
    db: Arc<Database>,
    bus: Arc<EventBus>,
    live_handler: Arc<dyn LiveEventHandler>,
    budget: RateBudget,
    rpc_timeout: Duration,
    flood_until: Option<Instant>,
    status_tx: watch::Sender<String>,
    dropped_events: Arc<AtomicU64>,
    interactive_rx: mpsc::Receiver<SessionRequest>,
    live_rx: mpsc::Receiver<SessionRequest>,
    backfill_rx: mpsc::Receiver<SessionRequest>,
    enrichment_rx: mpsc::Receiver<SessionRequest>,
    cancel: CancellationToken,
}

impl SessionActor {
    /// Spawn an actor for an account; returns the handle used by every other
    /// component.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        account_id: i32,
        initial_status: String,
        rpc: Arc<dyn TelegramRpc>,
        db: Arc<Database>,
        bus: Arc<EventBus>,
        live_handler: Arc<dyn LiveEventHandler>,
        config: &TelegramConfig,
        cancel: CancellationToken,
    ) -> SessionHandle {
        let (interactive_tx, interactive_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (live_tx, live_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (backfill_tx, backfill_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (enrichment_tx, enrichment_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(initial_status);
        let dropped_events = Arc::new(AtomicU64::new(0));

        let actor = SessionActor {
            account_id,
            rpc,
            db,
            bus,
            live_handler,
            budget: RateBudget::new(RateLimitMode::from_name(&config.rate_limit_mode)),
            rpc_timeout: config.rpc_timeout,
            flood_until: None,
            status_tx,
            dropped_events: dropped_events.clone(),
            interactive_rx,
            live_rx,
            backfill_rx,
            enrichment_rx,
            cancel,
        };

        tokio::spawn(actor.run());

        SessionHandle {
            account_id,
            interactive_tx,
            live_tx,
            backfill_tx,
            enrichment_tx,
            status_rx,
            dropped_events,
        }
    }

    async fn run(mut self) {
        info!(account_id = self.account_id, "Session actor started");
        let mut events: Option<broadcast::Receiver<LiveEvent>> = Some(self.rpc.subscribe());

        loop {
            // FloodWait is a hard pause on every upstream interaction.
            if let Some(until) = self.flood_until {
                if Instant::now() < until {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep_until(until) => {}
                    }
                }
                self.flood_until = None;
                self.set_status(status::ACTIVE).await;
                self.persist_flood_wait(None).await;
            }

            let next = {
                let events_open = events.is_some();
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Next::Shutdown,
                    Some(req) = self.interactive_rx.recv() => Next::Request(req),
                    ev = async { events.as_mut().expect("guarded by events_open").recv().await }, if events_open => Next::Event(ev),
                    Some(req) = self.live_rx.recv() => Next::Request(req),
                    Some(req) = self.backfill_rx.recv() => Next::Request(req),
                    Some(req) = self.enrichment_rx.recv() => Next::Request(req),
                    else => Next::Shutdown,
                }
            };

            match next {
                Next::Shutdown => break,
                Next::Event(Ok(event)) => {
                    self.live_handler.handle(self.account_id, event).await;
                }
                Next::Event(Err(broadcast::error::RecvError::Lagged(n))) => {
                    self.dropped_events.fetch_add(n, Ordering::Relaxed);
                    warn!(
                        account_id = self.account_id,
                        dropped = n,
                        "Live event channel overflowed, oldest events dropped"
                    );
                }
                Next::Event(Err(broadcast::error::RecvError::Closed)) => {
                    debug!(account_id = self.account_id, "Live event stream closed");
                    events = None;
                }
                Next::Request(request) => self.handle_request(request).await,
            }
        }

        let _ = self.rpc.disconnect().await;
        info!(account_id = self.account_id, "Session actor stopped");
    }

    async fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::Connect { reply } => {
                let result = self.upstream(self.rpc.clone(), |rpc| async move {
                    rpc.connect().await
                })
                .await;
                match &result {
                    Ok(ConnectOutcome::CodeRequired) => {
                        self.set_status(status::CODE_REQUIRED).await;
                    }
                    Ok(ConnectOutcome::Authorized(user)) => {
                        let user = user.clone();
                        self.mark_authorized(&user).await;
                    }
                    Err(_) => {}
                }
                let _ = reply.send(result);
            }
            SessionRequest::SubmitCode { code, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.sign_in_code(&code).await
                })
                .await;
                match &result {
                    Ok(SignInOutcome::PasswordRequired) => {
                        self.set_status(status::PASSWORD_REQUIRED).await;
                    }
                    Ok(SignInOutcome::Authorized(user)) => {
                        let user = user.clone();
                        self.mark_authorized(&user).await;
                    }
                    Err(_) => {}
                }
                let _ = reply.send(result);
            }
            SessionRequest::SubmitPassword { password, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.sign_in_password(&password).await
                })
                .await;
                if let Ok(user) = &result {
                    let user = user.clone();
                    self.mark_authorized(&user).await;
                }
                let _ = reply.send(result);
            }
            SessionRequest::Disconnect { reply } => {
                let result = self.rpc.disconnect().await;
                self.set_status(status::DISCONNECTED).await;
                let _ = reply.send(result);
            }
            SessionRequest::ListDialogs { reply } => {
                let result = self.upstream(self.rpc.clone(), |rpc| async move {
                    rpc.list_dialogs().await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::HistoryPage {
                dialog_id,
                offset_id,
                page_size,
                reply,
            } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.history_page(dialog_id, offset_id, page_size).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::DownloadMedia {
                dialog_id,
                message_id,
                reply,
            } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.download_media(dialog_id, message_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::GetEntity { user_id, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.get_entity(user_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::Participants { dialog_id, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.participants(dialog_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::ProfilePhotos { user_id, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.profile_photos(user_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::DownloadProfilePhoto {
                user_id,
                photo_id,
                reply,
            } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.download_profile_photo(user_id, photo_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::Stories { user_id, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.stories(user_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::DownloadStory {
                user_id,
                story_id,
                reply,
            } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.download_story(user_id, story_id).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::ResolveInvite { hash, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.resolve_invite(&hash).await
                })
                .await;
                let _ = reply.send(result);
            }
            SessionRequest::JoinInvite { hash, reply } => {
                let result = self.upstream(self.rpc.clone(), move |rpc| async move {
                    rpc.join_invite(&hash).await
                })
                .await;
                let _ = reply.send(result);
            }
        }
    }

    /// Pay the rate budget, run one upstream call with a timeout, and apply
    /// session-wide consequences of the outcome.
    async fn upstream<T, F, Fut>(&mut self, rpc: Arc<dyn TelegramRpc>, f: F) -> Result<T, RpcError>
    where
        F: FnOnce(Arc<dyn TelegramRpc>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        self.budget.acquire().await;

        let result = match tokio::time::timeout(self.rpc_timeout, f(rpc)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Temporary("upstream call timed out".into())),
        };

        match &result {
            Err(RpcError::FloodWait { seconds }) => {
                let until = Instant::now() + Duration::from_secs(*seconds as u64);
                self.flood_until = Some(until);
                self.set_status(status::FLOOD_WAIT).await;
                let deadline = Utc::now().naive_utc()
                    + chrono::Duration::seconds(*seconds as i64);
                self.persist_flood_wait(Some(deadline)).await;
                warn!(
                    account_id = self.account_id,
                    seconds, "FloodWait received, pausing session"
                );
            }
            Err(RpcError::SessionBanned) => {
                self.set_status(status::BANNED).await;
                self.record_error("session banned").await;
            }
            Err(RpcError::AuthRequired) => {
                self.set_status(status::CODE_REQUIRED).await;
            }
            Err(err) => {
                self.record_error(&err.to_string()).await;
            }
            Ok(_) => {}
        }

        result
    }

    async fn set_status(&self, new_status: &str) {
        let _ = self.status_tx.send(new_status.to_string());
        self.bus
            .publish(DomainEvent::AccountStatus {
                account_id: self.account_id,
                status: new_status.to_string(),
            })
            .await;
        match self.db.get_connection().await {
            Ok(mut conn) => {
                if let Err(e) =
                    store::accounts::set_status(&mut conn, self.account_id, new_status).await
                {
                    error!(
                        account_id = self.account_id,
                        error = %e,
                        "Failed to persist account status"
                    );
                }
            }
            Err(e) => error!(account_id = self.account_id, error = %e, "No connection for status update"),
        }
    }

    async fn persist_flood_wait(&self, until: Option<chrono::NaiveDateTime>) {
        if let Ok(mut conn) = self.db.get_connection().await {
            let _ = store::accounts::set_flood_wait(&mut conn, self.account_id, until).await;
        }
    }

    async fn record_error(&self, message: &str) {
        if let Ok(mut conn) = self.db.get_connection().await {
            let _ = store::accounts::record_error(&mut conn, self.account_id, message).await;
        }
    }

    async fn mark_authorized(&mut self, user: &RpcUser) {
        self.set_status(status::ACTIVE).await;
        match self.db.get_connection().await {
            Ok(mut conn) => {
                if let Err(e) = store::accounts::mark_authorized(
                    &mut conn,
                    self.account_id,
                    user.id,
                    user.username.as_deref(),
                    user.first_name.as_deref(),
                    user.last_name.as_deref(),
                )
                .await
                {
                    error!(
                        account_id = self.account_id,
                        error = %e,
                        "Failed to persist authorized identity"
                    );
                }
            }
            Err(e) => error!(account_id = self.account_id, error = %e, "No connection for auth update"),
        }
    }
}
