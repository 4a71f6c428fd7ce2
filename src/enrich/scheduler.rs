// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Single-flight periodic runner shared by the enrichment scans.
//!
//! Each scheduler sleeps its interval and can be triggered through the
//! command API; a trigger while a pass is running is a no-op. The interval
//! is adjustable at runtime and takes effect from the next sleep.

use chrono::{NaiveDateTime, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Default)]
struct SchedulerState {
    last_run_at: Option<NaiveDateTime>,
    last_result: Option<String>,
}

/// Handle to a running scheduler, for `run_now`, `settings` and `status`.
#[derive(Clone)]
pub struct SchedulerHandle {
    name: &'static str,
    interval: Arc<Mutex<Duration>>,
    running: Arc<AtomicBool>,
    trigger: Arc<Notify>,
    state: Arc<Mutex<SchedulerState>>,
}

impl SchedulerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request an immediate pass; ignored while one is in flight.
    pub fn run_now(&self) {
        if !self.running.load(Ordering::SeqCst) {
            self.trigger.notify_one();
        }
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Change the cadence; applies from the next sleep.
    pub fn set_interval(&self, interval: Duration) {
        let interval = interval.max(Duration::from_secs(1));
        *self.interval.lock().unwrap_or_else(|p| p.into_inner()) = interval;
        info!(
            scheduler = self.name,
            interval_secs = interval.as_secs(),
            "Scheduler interval updated"
        );
    }

    pub fn status(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        json!({
            "name": self.name,
            "interval_secs": self.interval().as_secs(),
            "running": self.running.load(Ordering::SeqCst),
            "last_run_at": state.last_run_at,
            "last_result": state.last_result,
        })
    }
}

/// Spawn a named periodic task. `task` returns how many items it touched.
pub fn spawn<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    task: F,
) -> SchedulerHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<usize>> + Send,
{
    let handle = SchedulerHandle {
        name,
        interval: Arc::new(Mutex::new(interval.max(Duration::from_secs(1)))),
        running: Arc::new(AtomicBool::new(false)),
        trigger: Arc::new(Notify::new()),
        state: Arc::new(Mutex::new(SchedulerState::default())),
    };

    let looper = handle.clone();
    tokio::spawn(async move {
        info!(
            scheduler = name,
            interval_secs = looper.interval().as_secs(),
            "Scheduler started"
        );

        loop {
            let sleep = looper.interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep) => {}
                _ = looper.trigger.notified() => {}
            }

            if looper.running.swap(true, Ordering::SeqCst) {
                continue;
            }
            let result = task().await;
            looper.running.store(false, Ordering::SeqCst);

            let mut state = looper.state.lock().unwrap_or_else(|p| p.into_inner());
            state.last_run_at = Some(Utc::now().naive_utc());
            match result {
                Ok(touched) => {
                    info!(scheduler = name, touched, "Scheduler pass finished");
                    state.last_result = Some(format!("ok: {} items", touched));
                }
                Err(e) => {
                    error!(scheduler = name, error = %e, "Scheduler pass failed");
                    state.last_result = Some(format!("error: {}", e));
                }
            }
        }
        info!(scheduler = name, "Scheduler stopped");
    });

    handle
}
