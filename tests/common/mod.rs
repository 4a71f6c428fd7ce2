#![allow(dead_code)]

//! Shared scaffolding for the end-to-end scenario tests.
//!
//! These tests need a Postgres instance; they skip with a notice when
//! `TEST_DATABASE_URL` is unset. Engines run against the deterministic
//! in-memory upstream, with media and session roots in a temp directory.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::OnceCell;

use telegram_indexer::config::Config;
use telegram_indexer::db::{init_database, Database};
use telegram_indexer::engine::Engine;
use telegram_indexer::models::account::{status as account_status, Account, NewAccount};
use telegram_indexer::store;
use telegram_indexer::telegram::sim::{SimRpc, SimRpcFactory};

static DB: OnceCell<Arc<Database>> = OnceCell::const_new();
static COUNTER: AtomicU32 = AtomicU32::new(0);

pub struct TestHarness {
    pub engine: Arc<Engine>,
    pub factory: Arc<SimRpcFactory>,
    pub media_root: TempDir,
}

/// Build an engine against the test database, or `None` (skip) when no
/// database is configured.
pub async fn harness() -> Option<TestHarness> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping: TEST_DATABASE_URL is not set");
            return None;
        }
    };

    let media_root = TempDir::new().expect("temp media root");

    let mut config = Config::from_env();
    config.database.url = url.clone();
    config.media.root = media_root.path().join("media");
    config.telegram.session_root = media_root.path().join("sessions");
    config.telegram.retry_jitter = false;
    config.telegram.retry_delay_base = Duration::from_millis(50);
    config.telegram.retry_max_attempts = 3;
    config.media.retry_delay_base = Duration::from_millis(50);
    config.media.retry_interval = Duration::from_secs(3600);
    config.backfill.page_size = 50;
    // Schedulers tick long after these tests finish.
    config.enrichment.member_scrape_interval = Duration::from_secs(3600);
    config.enrichment.profile_photo_interval = Duration::from_secs(3600);
    config.enrichment.story_interval = Duration::from_secs(3600);

    let db = DB
        .get_or_init(|| async {
            Arc::new(
                init_database(&config.database)
                    .await
                    .expect("test database"),
            )
        })
        .await
        .clone();

    let factory = Arc::new(SimRpcFactory::new());
    let engine = Engine::build(config, db, factory.clone())
        .await
        .expect("engine");

    Some(TestHarness {
        engine,
        factory,
        media_root,
    })
}

/// Process-unique suffix for phones and upstream ids, so parallel tests and
/// repeated runs never collide in the shared database.
pub fn unique_id() -> i64 {
    let pid = std::process::id() as i64;
    let n = COUNTER.fetch_add(1, Ordering::SeqCst) as i64;
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos() as i64;
    (pid % 10_000) * 1_000_000_000 + n * 1_000_000 + nanos % 1_000_000
}

/// Create an account row plus its scripted, already-authorized connection.
pub async fn active_account(harness: &TestHarness, tag: &str) -> (Account, Arc<SimRpc>) {
    let phone = format!("+99{}", unique_id() % 10_000_000_000);
    let mut conn = harness.engine.db.get_connection().await.expect("conn");
    let account = store::accounts::create(
        &mut conn,
        &NewAccount {
            phone: phone.clone(),
            api_id: 1,
            api_hash: format!("hash-{}", tag),
            status: account_status::NEW.to_string(),
            proxy_type: None,
            proxy_host: None,
            proxy_port: None,
            proxy_username: None,
            proxy_password: None,
        },
    )
    .await
    .expect("account");

    let rpc = Arc::new(SimRpc::new());
    rpc.set_authorized(telegram_indexer::telegram::rpc::RpcUser {
        id: unique_id(),
        username: Some(format!("acct_{}", tag)),
        first_name: Some("Test".into()),
        ..Default::default()
    });
    harness.factory.register(&phone, rpc.clone());
    (account, rpc)
}

/// Poll until `check` returns true or the timeout elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
