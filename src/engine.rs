// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Root engine: owns every component and wires them together at
//! construction. Components never reach for globals; collaborators are
//! handed in here.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::autojoin::AutoJoiner;
use crate::bus::EventBus;
use crate::config::Config;
use crate::db::Database;
use crate::enrich::members::MemberScraper;
use crate::enrich::photos::ProfilePhotoScanner;
use crate::enrich::scheduler::{self, SchedulerHandle};
use crate::enrich::stories::StoryScanner;
use crate::extract::Extractor;
use crate::ingest::backfill::BackfillCoordinator;
use crate::ingest::listener::LiveIngestor;
use crate::media::retry_service::MediaRetryService;
use crate::media::{MediaJob, MediaPipeline};
use crate::registry::DialogRegistry;
use crate::store;
use crate::telegram::manager::SessionManager;
use crate::telegram::rpc::RpcFactory;

/// Media job queue depth between capture and the download workers.
const MEDIA_QUEUE_CAPACITY: usize = 4096;

pub struct Schedulers {
    pub member_scrape: SchedulerHandle,
    pub profile_photos: SchedulerHandle,
    pub stories: SchedulerHandle,
}

pub struct Engine {
    pub config: Config,
    pub db: Arc<Database>,
    pub bus: Arc<EventBus>,
    pub extractor: Arc<Extractor>,
    pub manager: Arc<SessionManager>,
    pub registry: Arc<DialogRegistry>,
    pub backfill: Arc<BackfillCoordinator>,
    pub autojoin: Arc<AutoJoiner>,
    pub schedulers: Schedulers,
    pub media_tx: mpsc::Sender<MediaJob>,
    cancel: CancellationToken,
}

impl Engine {
    /// Construct the engine and start its background services.
    pub async fn build(
        config: Config,
        db: Arc<Database>,
        factory: Arc<dyn RpcFactory>,
    ) -> anyhow::Result<Arc<Engine>> {
        let cancel = CancellationToken::new();
        let bus = Arc::new(EventBus::new());
        let extractor = Arc::new(Extractor::new(&config.detection));

        // The builtin detector registry must exist before the first scan.
        {
            let mut conn = db.get_connection().await?;
            store::detections::ensure_builtin(&mut conn).await?;
        }

        let (media_tx, media_rx) = mpsc::channel::<MediaJob>(MEDIA_QUEUE_CAPACITY);

        let listener = Arc::new(LiveIngestor::new(
            db.clone(),
            bus.clone(),
            extractor.clone(),
            media_tx.clone(),
        ));

        let manager = Arc::new(SessionManager::new(
            db.clone(),
            bus.clone(),
            config.telegram.clone(),
            factory,
            listener,
            cancel.child_token(),
        ));

        let pipeline = MediaPipeline::new(db.clone(), bus.clone(), manager.clone(), config.clone());
        tokio::spawn(pipeline.run(media_rx, cancel.child_token()));

        let retry_service =
            MediaRetryService::new(db.clone(), media_tx.clone(), config.media.clone());
        tokio::spawn(retry_service.run(cancel.child_token()));

        let registry = Arc::new(DialogRegistry::new(db.clone()));

        let backfill = Arc::new(BackfillCoordinator::new(
            db.clone(),
            bus.clone(),
            manager.clone(),
            extractor.clone(),
            media_tx.clone(),
            &config,
            cancel.child_token(),
        ));

        let autojoin = Arc::new(AutoJoiner::new(
            db.clone(),
            manager.clone(),
            registry.clone(),
            backfill.clone(),
            config.clone(),
        ));
        tokio::spawn(autojoin.clone().run(cancel.child_token()));

        let member_scraper = Arc::new(MemberScraper::new(db.clone(), manager.clone(), &config));
        let member_scrape = scheduler::spawn(
            "member_scrape",
            config.enrichment.member_scrape_interval,
            cancel.child_token(),
            move || {
                let scraper = member_scraper.clone();
                async move { scraper.run_once().await }
            },
        );

        let photo_scanner = Arc::new(ProfilePhotoScanner::new(db.clone(), manager.clone(), &config));
        let profile_photos = scheduler::spawn(
            "profile_photos",
            config.enrichment.profile_photo_interval,
            cancel.child_token(),
            move || {
                let scanner = photo_scanner.clone();
                async move { scanner.run_once().await }
            },
        );

        let story_scanner = Arc::new(StoryScanner::new(db.clone(), manager.clone(), &config));
        let stories = scheduler::spawn(
            "stories",
            config.enrichment.story_interval,
            cancel.child_token(),
            move || {
                let scanner = story_scanner.clone();
                async move { scanner.run_once().await }
            },
        );

        // Persisted cadence overrides beat the env defaults.
        {
            let mut conn = db.get_connection().await?;
            for handle in [&member_scrape, &profile_photos, &stories] {
                let key = format!("scheduler:{}", handle.name());
                if let Some(value) = store::settings::get(&mut conn, &key).await? {
                    if let Some(secs) = value.get("interval_secs").and_then(|v| v.as_u64()) {
                        handle.set_interval(std::time::Duration::from_secs(secs));
                    }
                }
            }
        }

        info!("Engine built");
        Ok(Arc::new(Engine {
            config,
            db,
            bus,
            extractor,
            manager,
            registry,
            backfill,
            autojoin,
            schedulers: Schedulers {
                member_scrape,
                profile_photos,
                stories,
            },
            media_tx,
            cancel,
        }))
    }

    /// Graceful shutdown: cancel workers, let in-flight commits finish,
    /// close sessions.
    pub async fn shutdown(&self) {
        info!("Engine shutting down");
        self.cancel.cancel();
        // Session actors disconnect on their way out; give in-flight
        // database work a moment to commit.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}
