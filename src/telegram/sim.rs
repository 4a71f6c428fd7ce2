// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Deterministic in-memory upstream.
//!
//! Stands behind [`TelegramRpc`] for local runs and the end-to-end scenario
//! tests: auth handshakes, dialog listings, history pages, media payloads and
//! invite flows are all scripted in memory, and failures can be injected per
//! call. A production adapter wrapping a real client library replaces this
//! through [`RpcFactory`] without touching the engine.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::models::account::Account;
use crate::telegram::rpc::{
    ConnectOutcome, InvitePreview, JoinOutcome, LiveEvent, MediaPayload, RpcDialog, RpcError,
    RpcFactory, RpcMessage, RpcParticipant, RpcProfilePhoto, RpcStory, RpcUser, SignInOutcome,
    TelegramRpc,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct SimState {
    authorized: bool,
    login_code: Option<String>,
    password: Option<String>,
    code_accepted: bool,
    me: RpcUser,
    dialogs: Vec<RpcDialog>,
    /// Full history per dialog, ascending by message id.
    history: HashMap<i64, Vec<RpcMessage>>,
    media: HashMap<(i64, i64), MediaPayload>,
    participants: HashMap<i64, Vec<RpcParticipant>>,
    profile_photos: HashMap<i64, Vec<RpcProfilePhoto>>,
    photo_payloads: HashMap<(i64, i64), MediaPayload>,
    stories: HashMap<i64, Vec<RpcStory>>,
    story_payloads: HashMap<(i64, i64), MediaPayload>,
    users: HashMap<i64, RpcUser>,
    invites: HashMap<String, (InvitePreview, JoinOutcome)>,
    joined_hashes: Vec<String>,
    /// Errors injected into upcoming calls, consumed front-first.
    fail_next: VecDeque<RpcError>,
    /// Per-call script for upcoming history calls: `Some` fails the call,
    /// `None` lets it through.
    history_fail_next: VecDeque<Option<RpcError>>,
}

/// Scripted in-memory connection for one account.
pub struct SimRpc {
    state: Mutex<SimState>,
    events: broadcast::Sender<LiveEvent>,
}

impl Default for SimRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRpc {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(SimState::default()),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // ---- scripting -------------------------------------------------------

    /// Require a login handshake: `code`, then optionally `password`.
    pub fn require_login(&self, code: &str, password: Option<&str>) {
        let mut state = self.lock();
        state.authorized = false;
        state.code_accepted = false;
        state.login_code = Some(code.to_string());
        state.password = password.map(|p| p.to_string());
    }

    pub fn set_authorized(&self, me: RpcUser) {
        let mut state = self.lock();
        state.authorized = true;
        state.me = me;
    }

    pub fn set_me(&self, me: RpcUser) {
        self.lock().me = me;
    }

    pub fn add_dialog(&self, dialog: RpcDialog) {
        self.lock().dialogs.push(dialog);
    }

    /// Replace the history of a dialog; messages may arrive in any order.
    pub fn set_history(&self, dialog_id: i64, mut messages: Vec<RpcMessage>) {
        messages.sort_by_key(|m| m.id);
        self.lock().history.insert(dialog_id, messages);
    }

    pub fn set_media(&self, dialog_id: i64, message_id: i64, payload: MediaPayload) {
        self.lock().media.insert((dialog_id, message_id), payload);
    }

    pub fn set_participants(&self, dialog_id: i64, members: Vec<RpcParticipant>) {
        self.lock().participants.insert(dialog_id, members);
    }

    pub fn set_profile_photos(&self, user_id: i64, photos: Vec<RpcProfilePhoto>) {
        self.lock().profile_photos.insert(user_id, photos);
    }

    pub fn set_photo_payload(&self, user_id: i64, photo_id: i64, payload: MediaPayload) {
        self.lock().photo_payloads.insert((user_id, photo_id), payload);
    }

    pub fn set_stories(&self, user_id: i64, stories: Vec<RpcStory>) {
        self.lock().stories.insert(user_id, stories);
    }

    pub fn set_story_payload(&self, user_id: i64, story_id: i64, payload: MediaPayload) {
        self.lock().story_payloads.insert((user_id, story_id), payload);
    }

    pub fn set_user(&self, user: RpcUser) {
        self.lock().users.insert(user.id, user);
    }

    pub fn set_invite(&self, hash: &str, preview: InvitePreview, outcome: JoinOutcome) {
        self.lock()
            .invites
            .insert(hash.to_string(), (preview, outcome));
    }

    /// Inject an error consumed by the next upstream call.
    pub fn fail_next(&self, error: RpcError) {
        self.lock().fail_next.push_back(error);
    }

    /// Inject an error consumed by the next history call.
    pub fn fail_next_history(&self, error: RpcError) {
        self.lock().history_fail_next.push_back(Some(error));
    }

    /// Let the next history call through; composes with
    /// [`SimRpc::fail_next_history`] to fail the Nth call.
    pub fn pass_next_history(&self) {
        self.lock().history_fail_next.push_back(None);
    }

    /// Push a live event to subscribers, as the upstream connection would.
    pub fn push_live(&self, event: LiveEvent) {
        let _ = self.events.send(event);
    }

    pub fn joined_hashes(&self) -> Vec<String> {
        self.lock().joined_hashes.clone()
    }

    fn take_injected(&self) -> Option<RpcError> {
        self.lock().fail_next.pop_front()
    }
}

#[async_trait]
impl TelegramRpc for SimRpc {
    async fn connect(&self) -> Result<ConnectOutcome, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let state = self.lock();
        if state.authorized {
            Ok(ConnectOutcome::Authorized(state.me.clone()))
        } else {
            Ok(ConnectOutcome::CodeRequired)
        }
    }

    async fn sign_in_code(&self, code: &str) -> Result<SignInOutcome, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut state = self.lock();
        match &state.login_code {
            Some(expected) if expected == code => {
                state.code_accepted = true;
                if state.password.is_some() {
                    Ok(SignInOutcome::PasswordRequired)
                } else {
                    state.authorized = true;
                    Ok(SignInOutcome::Authorized(state.me.clone()))
                }
            }
            Some(_) => Err(RpcError::InvalidCode),
            None => Err(RpcError::Permanent("no login pending".into())),
        }
    }

    async fn sign_in_password(&self, password: &str) -> Result<RpcUser, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut state = self.lock();
        if !state.code_accepted {
            return Err(RpcError::AuthRequired);
        }
        match &state.password {
            Some(expected) if expected == password => {
                state.authorized = true;
                Ok(state.me.clone())
            }
            _ => Err(RpcError::InvalidPassword),
        }
    }

    async fn disconnect(&self) -> Result<(), RpcError> {
        Ok(())
    }

    async fn list_dialogs(&self) -> Result<Vec<RpcDialog>, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        Ok(self.lock().dialogs.clone())
    }

    async fn history_page(
        &self,
        dialog_id: i64,
        offset_id: i64,
        page_size: usize,
    ) -> Result<Vec<RpcMessage>, RpcError> {
        {
            let mut state = self.lock();
            if let Some(Some(err)) = state.history_fail_next.pop_front() {
                return Err(err);
            }
            if let Some(err) = state.fail_next.pop_front() {
                return Err(err);
            }
        }
        let state = self.lock();
        let cutoff = if offset_id <= 0 { i64::MAX } else { offset_id };
        let mut page: Vec<RpcMessage> = state
            .history
            .get(&dialog_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.id < cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(page_size);
        Ok(page)
    }

    async fn download_media(
        &self,
        dialog_id: i64,
        message_id: i64,
    ) -> Result<MediaPayload, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        self.lock()
            .media
            .get(&(dialog_id, message_id))
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("media {}/{}", dialog_id, message_id)))
    }

    async fn get_entity(&self, user_id: i64) -> Result<RpcUser, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        self.lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("user {}", user_id)))
    }

    async fn participants(&self, dialog_id: i64) -> Result<Vec<RpcParticipant>, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        Ok(self
            .lock()
            .participants
            .get(&dialog_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn profile_photos(&self, user_id: i64) -> Result<Vec<RpcProfilePhoto>, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        Ok(self
            .lock()
            .profile_photos
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_profile_photo(
        &self,
        user_id: i64,
        photo_id: i64,
    ) -> Result<MediaPayload, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        self.lock()
            .photo_payloads
            .get(&(user_id, photo_id))
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("photo {}/{}", user_id, photo_id)))
    }

    async fn stories(&self, user_id: i64) -> Result<Vec<RpcStory>, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        Ok(self
            .lock()
            .stories
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download_story(
        &self,
        user_id: i64,
        story_id: i64,
    ) -> Result<MediaPayload, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        self.lock()
            .story_payloads
            .get(&(user_id, story_id))
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("story {}/{}", user_id, story_id)))
    }

    async fn resolve_invite(&self, hash: &str) -> Result<InvitePreview, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        self.lock()
            .invites
            .get(hash)
            .map(|(preview, _)| preview.clone())
            .ok_or_else(|| RpcError::NotFound(format!("invite {}", hash)))
    }

    async fn join_invite(&self, hash: &str) -> Result<JoinOutcome, RpcError> {
        if let Some(err) = self.take_injected() {
            return Err(err);
        }
        let mut state = self.lock();
        match state.invites.get(hash).map(|(_, outcome)| outcome.clone()) {
            Some(outcome) => {
                if matches!(outcome, JoinOutcome::Joined(_)) {
                    state.joined_hashes.push(hash.to_string());
                }
                Ok(outcome)
            }
            None => Ok(JoinOutcome::Invalid),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }
}

/// Factory handing out scripted connections keyed by account phone. Unknown
/// phones get a fresh unauthorized connection expecting code `11111`.
pub struct SimRpcFactory {
    rpcs: Mutex<HashMap<String, Arc<SimRpc>>>,
}

impl Default for SimRpcFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRpcFactory {
    pub fn new() -> Self {
        Self {
            rpcs: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-register the scripted connection for a phone number.
    pub fn register(&self, phone: &str, rpc: Arc<SimRpc>) {
        self.rpcs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(phone.to_string(), rpc);
    }

    pub fn get(&self, phone: &str) -> Option<Arc<SimRpc>> {
        self.rpcs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(phone)
            .cloned()
    }
}

#[async_trait]
impl RpcFactory for SimRpcFactory {
    async fn create(
        &self,
        account: &Account,
        _session_path: &Path,
    ) -> Result<Arc<dyn TelegramRpc>, RpcError> {
        let mut rpcs = self.rpcs.lock().unwrap_or_else(|p| p.into_inner());
        let rpc = rpcs
            .entry(account.phone.clone())
            .or_insert_with(|| {
                let rpc = Arc::new(SimRpc::new());
                rpc.require_login("11111", None);
                rpc
            })
            .clone();
        Ok(rpc)
    }
}
