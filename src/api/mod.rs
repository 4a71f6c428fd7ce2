// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

pub mod routes;
pub mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::engine::Engine;

/// Start the API server until the process exits.
pub async fn start_api_server(config: &ApiConfig, engine: Arc<Engine>) -> anyhow::Result<()> {
    let app = create_router(engine);

    let addr = SocketAddr::new(config.host.parse()?, config.port);

    tracing::info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(engine: Arc<Engine>) -> Router {
    Router::new()
        // Health routes
        .route("/health", get(handlers::health::health_check))
        // Account routes
        .route("/accounts", get(handlers::accounts::list_accounts))
        .route("/accounts", post(handlers::accounts::create_account))
        .route("/accounts/with-groups", get(handlers::accounts::list_with_groups))
        .route("/accounts/:id", delete(handlers::accounts::delete_account))
        .route("/accounts/:id/connect", post(handlers::accounts::connect))
        .route("/accounts/:id/code", post(handlers::accounts::submit_code))
        .route("/accounts/:id/password", post(handlers::accounts::submit_password))
        .route("/accounts/:id/disconnect", post(handlers::accounts::disconnect))
        // Dialog routes
        .route("/accounts/:id/dialogs/available", get(handlers::dialogs::list_available))
        .route("/accounts/:id/dialogs", post(handlers::dialogs::add_dialogs))
        .route("/dialogs", get(handlers::dialogs::list_managed))
        .route("/dialogs/:id/assign", post(handlers::dialogs::assign))
        .route("/dialogs/:id/monitoring", post(handlers::dialogs::toggle_monitoring))
        .route("/dialogs/:id/options", put(handlers::dialogs::set_options))
        .route("/dialogs/:id/pause", post(handlers::dialogs::pause))
        .route("/dialogs/:id/resume", post(handlers::dialogs::resume))
        .route("/dialogs/:id/backfill/start", post(handlers::dialogs::start_backfill))
        .route("/dialogs/:id/backfill/stop", post(handlers::dialogs::stop_backfill))
        // Invite routes
        .route("/invites", get(handlers::invites::list_invites))
        .route("/invites", post(handlers::invites::create_invite))
        .route("/invites/:id", delete(handlers::invites::delete_invite))
        .route("/invites/:id/resolve", post(handlers::invites::resolve_invite))
        .route("/invites/:id/join", post(handlers::invites::join_now))
        .route("/autojoin/config", get(handlers::invites::autojoin_config_get))
        .route("/autojoin/config", put(handlers::invites::autojoin_config_set))
        // Detector routes
        .route("/detectors", get(handlers::detectors::list_detectors))
        .route("/detectors", post(handlers::detectors::create_detector))
        .route("/detectors/:id/active", put(handlers::detectors::set_detector_active))
        // Scheduler routes
        .route("/schedulers", get(handlers::schedulers::list_schedulers))
        .route("/schedulers/:name", get(handlers::schedulers::scheduler_status))
        .route("/schedulers/:name/run", post(handlers::schedulers::run_now))
        .route("/schedulers/:name/settings", put(handlers::schedulers::set_settings))
        // Corpus read side
        .route("/dialogs/:id/messages", get(handlers::data::dialog_messages))
        .route("/users/:id/photos", get(handlers::data::user_photos))
        .route("/users/:id/stories", get(handlers::data::user_stories))
        .route("/users/:id/identity-history", get(handlers::data::user_identity_history))
        .route("/users/:id/enrich", post(handlers::data::enrich_user))
        .route("/stats/detections", get(handlers::data::detection_stats))
        // Search
        .route("/search", get(handlers::search::search))
        // Event streams
        .route("/ws/stream", get(handlers::stream::stream))

        // Add shared state
        .with_state(engine)

        // Add tracing
        .layer(TraceLayer::new_for_http())
}
