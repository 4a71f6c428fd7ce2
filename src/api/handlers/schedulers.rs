// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::api::routes::{error, persistence_error, success};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::store;

fn scheduler<'a>(
    engine: &'a Engine,
    name: &str,
) -> Option<&'a crate::enrich::scheduler::SchedulerHandle> {
    match name {
        "member_scrape" => Some(&engine.schedulers.member_scrape),
        "profile_photos" => Some(&engine.schedulers.profile_photos),
        "stories" => Some(&engine.schedulers.stories),
        _ => None,
    }
}

pub async fn list_schedulers(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    success(json!([
        engine.schedulers.member_scrape.status(),
        engine.schedulers.profile_photos.status(),
        engine.schedulers.stories.status(),
    ]))
}

pub async fn scheduler_status(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match scheduler(&engine, &name) {
        Some(handle) => success(handle.status()),
        None => error(&EngineError::NotFound(format!("scheduler {}", name))),
    }
}

pub async fn run_now(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match scheduler(&engine, &name) {
        Some(handle) => {
            handle.run_now();
            success(json!({"scheduler": name, "triggered": true}))
        }
        None => error(&EngineError::NotFound(format!("scheduler {}", name))),
    }
}

#[derive(Debug, Deserialize)]
pub struct SchedulerSettingsRequest {
    pub interval_secs: u64,
}

/// Change a scheduler's cadence; persisted so restarts keep it.
pub async fn set_settings(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
    Json(req): Json<SchedulerSettingsRequest>,
) -> impl IntoResponse {
    let handle = match scheduler(&engine, &name) {
        Some(handle) => handle.clone(),
        None => return error(&EngineError::NotFound(format!("scheduler {}", name))),
    };
    if req.interval_secs == 0 {
        return error(&EngineError::InvalidRequest("interval must be positive".into()));
    }
    handle.set_interval(Duration::from_secs(req.interval_secs));

    let mut conn = match engine.db.get_connection().await {
        Ok(conn) => conn,
        Err(e) => return persistence_error(e),
    };
    let key = format!("scheduler:{}", name);
    if let Err(e) = store::settings::set(
        &mut conn,
        &key,
        &json!({"interval_secs": req.interval_secs}),
    )
    .await
    {
        return persistence_error(e);
    }
    success(handle.status())
}
