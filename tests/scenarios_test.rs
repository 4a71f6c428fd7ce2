//! End-to-end scenarios driving the engine against the scripted upstream.
//! Each test skips (with a notice) when TEST_DATABASE_URL is not set.

mod common;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use telegram_indexer::error::EngineError;
use telegram_indexer::models::account::Account;
use telegram_indexer::models::dialog::{kind, status as dialog_status, Dialog, NewDialog};
use telegram_indexer::schema::{detections, media_files, messages};
use telegram_indexer::store;
use telegram_indexer::telegram::rpc::{
    ConnectOutcome, InvitePreview, JoinOutcome, LiveEvent, MediaPayload, RpcDialog, RpcError,
    RpcMedia, RpcMessage, SignInOutcome,
};
use telegram_indexer::telegram::sim::SimRpc;

use common::{active_account, harness, unique_id, wait_for, TestHarness};

fn rpc_message(dialog_tg_id: i64, id: i64, sender: i64, text: &str) -> RpcMessage {
    RpcMessage {
        id,
        dialog_id: dialog_tg_id,
        sender_id: Some(sender),
        date: Utc::now(),
        text: Some(text.to_string()),
        reply_to: None,
        grouped_id: None,
        views: None,
        forwards: None,
        reactions: HashMap::new(),
        media: None,
    }
}

fn photo_message(dialog_tg_id: i64, id: i64, sender: i64) -> RpcMessage {
    let mut msg = rpc_message(dialog_tg_id, id, sender, "photo attached");
    msg.media = Some(RpcMedia {
        kind: "photo".to_string(),
        file_name: Some("pic.png".to_string()),
        file_size: None,
        mime_type: Some("image/png".to_string()),
    });
    msg
}

fn tiny_png() -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::new_rgba8(2, 2)
        .write_to(&mut buf, image::ImageOutputFormat::Png)
        .expect("encode png");
    buf
}

/// Register a managed, monitored dialog owned by the account.
async fn managed_dialog(
    harness: &TestHarness,
    account: &Account,
    telegram_id: i64,
) -> Dialog {
    let mut conn = harness.engine.db.get_connection().await.expect("conn");
    store::dialogs::upsert(
        &mut conn,
        &NewDialog {
            telegram_id,
            dialog_type: kind::SUPERGROUP.to_string(),
            title: Some(format!("group {}", telegram_id)),
            username: None,
            member_count: Some(10),
            account_id: Some(account.id),
            status: dialog_status::ACTIVE.to_string(),
            download_media: true,
            backfill_enabled: true,
            is_monitoring: true,
        },
    )
    .await
    .expect("dialog")
}

async fn message_count(harness: &TestHarness, dialog_id: i32) -> i64 {
    let mut conn = harness.engine.db.get_connection().await.expect("conn");
    messages::table
        .filter(messages::dialog_id.eq(dialog_id))
        .count()
        .get_result(&mut conn)
        .await
        .expect("count")
}

async fn detection_count(harness: &TestHarness, dialog_id: i32, detection_type: &str) -> i64 {
    let mut conn = harness.engine.db.get_connection().await.expect("conn");
    detections::table
        .inner_join(messages::table)
        .filter(messages::dialog_id.eq(dialog_id))
        .filter(detections::detection_type.eq(detection_type))
        .count()
        .get_result(&mut conn)
        .await
        .expect("count")
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().map(|n| n == "tmp").unwrap_or(false) {
                    continue;
                }
                count += count_files(&path);
            } else {
                count += 1;
            }
        }
    }
    count
}

// S1: fresh account walks code -> password -> active and sees dialogs.
#[tokio::test]
async fn s1_auth_handshake_reaches_active() {
    let Some(h) = harness().await else { return };

    let phone = format!("+98{}", unique_id() % 10_000_000_000);
    let mut conn = h.engine.db.get_connection().await.expect("conn");
    let account = store::accounts::create(
        &mut conn,
        &telegram_indexer::models::account::NewAccount {
            phone: phone.clone(),
            api_id: 1,
            api_hash: "hash-s1".into(),
            status: telegram_indexer::models::account::status::NEW.to_string(),
            proxy_type: None,
            proxy_host: None,
            proxy_port: None,
            proxy_username: None,
            proxy_password: None,
        },
    )
    .await
    .expect("account");
    drop(conn);

    let rpc = Arc::new(SimRpc::new());
    rpc.require_login("11111", Some("pw"));
    rpc.set_me(telegram_indexer::telegram::rpc::RpcUser {
        id: unique_id(),
        username: Some("s1user".into()),
        ..Default::default()
    });
    rpc.add_dialog(RpcDialog {
        id: unique_id(),
        kind: kind::GROUP.to_string(),
        title: Some("first group".into()),
        username: None,
        member_count: Some(3),
    });
    h.factory.register(&phone, rpc);

    let outcome = h.engine.manager.connect(account.id).await.expect("connect");
    assert!(matches!(outcome, ConnectOutcome::CodeRequired));

    let outcome = h
        .engine
        .manager
        .submit_code(account.id, "11111")
        .await
        .expect("code");
    assert!(matches!(outcome, SignInOutcome::PasswordRequired));

    let user = h
        .engine
        .manager
        .submit_password(account.id, "pw")
        .await
        .expect("password");
    assert_eq!(user.username.as_deref(), Some("s1user"));

    let handle = h
        .engine
        .manager
        .require_session(account.id)
        .await
        .expect("session");
    let dialogs = handle.list_dialogs().await.expect("dialogs");
    assert!(!dialogs.is_empty());

    // The account row reflects the authorized state.
    let mut conn = h.engine.db.get_connection().await.expect("conn");
    let stored = store::accounts::get(&mut conn, account.id)
        .await
        .expect("get")
        .expect("account row");
    assert_eq!(stored.status, telegram_indexer::models::account::status::ACTIVE);
}

// S2: three-page backfill lands 150 rows, cursor at the oldest id, and a
// later live event adds exactly one more row.
#[tokio::test]
async fn s2_backfill_pages_then_live_event() {
    let Some(h) = harness().await else { return };

    let (account, rpc) = active_account(&h, "s2").await;
    h.engine.manager.connect(account.id).await.expect("connect");

    let dialog_tg_id = unique_id();
    let dialog = managed_dialog(&h, &account, dialog_tg_id).await;

    // Upstream ids 51..=200; page size 50 yields [200..151] [150..101] [100..51].
    let history: Vec<RpcMessage> = (51..=200)
        .map(|id| rpc_message(dialog_tg_id, id, 777, &format!("historical {}", id)))
        .collect();
    rpc.set_history(dialog_tg_id, history);

    h.engine.backfill.clone().start(dialog.id).await.expect("start");

    // Idempotent second start while running.
    h.engine.backfill.clone().start(dialog.id).await.expect("restart is a no-op");

    let finished = wait_for(Duration::from_secs(30), || async {
        !h.engine.backfill.is_running(dialog.id).await
    })
    .await;
    assert!(finished, "backfill did not finish in time");

    assert_eq!(message_count(&h, dialog.id).await, 150);

    let mut conn = h.engine.db.get_connection().await.expect("conn");
    let stored = store::dialogs::get(&mut conn, dialog.id)
        .await
        .expect("get")
        .expect("dialog");
    assert_eq!(stored.backfill_cursor, Some(51));
    assert_eq!(stored.status, dialog_status::ACTIVE);
    drop(conn);

    // A live event for a newer id inserts exactly one row.
    rpc.push_live(LiveEvent::NewMessage(rpc_message(
        dialog_tg_id,
        205,
        777,
        "fresh message",
    )));
    let landed = wait_for(Duration::from_secs(10), || async {
        message_count(&h, dialog.id).await == 151
    })
    .await;
    assert!(landed, "live event did not land");

    // Replaying the same event stays at 151.
    rpc.push_live(LiveEvent::NewMessage(rpc_message(
        dialog_tg_id,
        205,
        777,
        "fresh message",
    )));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(message_count(&h, dialog.id).await, 151);
}

// S3: a burst of live messages produces one message row and the expected
// normalized detections each.
#[tokio::test]
async fn s3_live_burst_with_detections() {
    let Some(h) = harness().await else { return };

    let (account, rpc) = active_account(&h, "s3").await;
    h.engine.manager.connect(account.id).await.expect("connect");

    let dialog_tg_id = unique_id();
    let dialog = managed_dialog(&h, &account, dialog_tg_id).await;

    for id in 1..=500 {
        rpc.push_live(LiveEvent::NewMessage(rpc_message(
            dialog_tg_id,
            id,
            888,
            "contact bob@example.com +14155550123",
        )));
    }

    let landed = wait_for(Duration::from_secs(120), || async {
        message_count(&h, dialog.id).await == 500
    })
    .await;
    assert!(landed, "not all live messages landed");

    assert_eq!(detection_count(&h, dialog.id, "email").await, 500);
    assert_eq!(detection_count(&h, dialog.id, "phone").await, 500);

    // Normalized values are canonical.
    let mut conn = h.engine.db.get_connection().await.expect("conn");
    let normalized: Vec<String> = detections::table
        .inner_join(messages::table)
        .filter(messages::dialog_id.eq(dialog.id))
        .filter(detections::detection_type.eq("email"))
        .select(detections::normalized_value)
        .distinct()
        .load(&mut conn)
        .await
        .expect("normalized");
    assert_eq!(normalized, vec!["bob@example.com".to_string()]);

    let phones: Vec<String> = detections::table
        .inner_join(messages::table)
        .filter(messages::dialog_id.eq(dialog.id))
        .filter(detections::detection_type.eq("phone"))
        .select(detections::normalized_value)
        .distinct()
        .load(&mut conn)
        .await
        .expect("phones");
    assert_eq!(phones, vec!["+14155550123".to_string()]);
}

// S4: the same bytes behind two messages yield two completed rows sharing
// one on-disk file.
#[tokio::test]
async fn s4_media_dedup_shares_one_file() {
    let Some(h) = harness().await else { return };

    let (account, rpc) = active_account(&h, "s4").await;
    h.engine.manager.connect(account.id).await.expect("connect");

    let dialog_a = unique_id();
    let dialog_b = unique_id();
    let stored_a = managed_dialog(&h, &account, dialog_a).await;
    let stored_b = managed_dialog(&h, &account, dialog_b).await;

    let bytes = tiny_png();
    rpc.set_media(
        dialog_a,
        1,
        MediaPayload {
            bytes: bytes.clone(),
            mime_type: Some("image/png".into()),
            file_name: Some("pic.png".into()),
            width: None,
            height: None,
            duration: None,
        },
    );
    rpc.set_media(
        dialog_b,
        1,
        MediaPayload {
            bytes: bytes.clone(),
            mime_type: Some("image/png".into()),
            file_name: Some("pic.png".into()),
            width: None,
            height: None,
            duration: None,
        },
    );

    rpc.push_live(LiveEvent::NewMessage(photo_message(dialog_a, 1, 999)));
    // The second message lands after the first completes, making the dedup
    // path deterministic.
    let first_done = wait_for(Duration::from_secs(30), || async {
        let mut conn = h.engine.db.get_connection().await.expect("conn");
        media_files::table
            .filter(media_files::dialog_id.eq(stored_a.id))
            .filter(media_files::processing_status.eq("completed"))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .unwrap_or(0)
            == 1
    })
    .await;
    assert!(first_done, "first media did not complete");

    rpc.push_live(LiveEvent::NewMessage(photo_message(dialog_b, 1, 999)));
    let second_done = wait_for(Duration::from_secs(30), || async {
        let mut conn = h.engine.db.get_connection().await.expect("conn");
        media_files::table
            .filter(media_files::dialog_id.eq(stored_b.id))
            .filter(media_files::processing_status.eq("completed"))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .unwrap_or(0)
            == 1
    })
    .await;
    assert!(second_done, "second media did not complete");

    let mut conn = h.engine.db.get_connection().await.expect("conn");
    let rows: Vec<(Option<String>, Option<String>)> = media_files::table
        .filter(media_files::dialog_id.eq_any(vec![stored_a.id, stored_b.id]))
        .select((media_files::content_hash, media_files::file_path))
        .load(&mut conn)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, rows[1].0, "same content hash");
    assert_eq!(rows[0].1, rows[1].1, "same on-disk file");
    assert!(rows[0].1.is_some());

    // Exactly one file landed under the media root.
    assert_eq!(count_files(&h.engine.config.media.root), 1);
}

// S5: rotation joins across two accounts with a one-per-day cap; the third
// join rate-limits.
#[tokio::test]
async fn s5_autojoin_rotation_daily_cap() {
    let Some(h) = harness().await else { return };

    let (a1, rpc1) = active_account(&h, "s5a").await;
    let (a2, rpc2) = active_account(&h, "s5b").await;
    h.engine.manager.connect(a1.id).await.expect("connect a1");
    h.engine.manager.connect(a2.id).await.expect("connect a2");

    let mut settings = h.engine.autojoin.settings().await.expect("settings");
    settings.enabled_accounts = vec![a1.id, a2.id];
    settings.max_joins_per_day = Some(1);
    settings.delay_seconds = Some(0);
    settings.auto_backfill = false;
    settings.auto_scrape_members = false;
    h.engine
        .autojoin
        .update_settings(&settings)
        .await
        .expect("update settings");

    let make_invite = |tag: i64| {
        (
            format!("https://t.me/+Grp{}", tag),
            format!("Grp{}", tag),
            RpcDialog {
                id: tag,
                kind: kind::SUPERGROUP.to_string(),
                title: Some(format!("joined {}", tag)),
                username: None,
                member_count: Some(5),
            },
        )
    };

    let mut joined_accounts = Vec::new();
    for n in 0..2 {
        let (link, hash, dialog) = make_invite(unique_id());
        for rpc in [&rpc1, &rpc2] {
            rpc.set_invite(
                &hash,
                InvitePreview {
                    invite_hash: hash.clone(),
                    title: dialog.title.clone(),
                    about: None,
                    member_count: dialog.member_count,
                    is_channel: Some(false),
                },
                JoinOutcome::Joined(dialog.clone()),
            );
        }
        let invite = h.engine.autojoin.create(&link, None, None).await.expect("create");
        let joined = h.engine.autojoin.join_now(invite.id).await.expect("join");
        assert_eq!(joined.status, "joined", "join {} should succeed", n);
        joined_accounts.push(joined.joined_account_id.expect("joined account"));
    }

    // Rotation used both accounts.
    assert_ne!(joined_accounts[0], joined_accounts[1]);
    assert!(joined_accounts.contains(&a1.id));
    assert!(joined_accounts.contains(&a2.id));

    // Third join within the day: both accounts are at the cap.
    let (link, hash, dialog) = make_invite(unique_id());
    for rpc in [&rpc1, &rpc2] {
        rpc.set_invite(
            &hash,
            InvitePreview {
                invite_hash: hash.clone(),
                title: dialog.title.clone(),
                about: None,
                member_count: dialog.member_count,
                is_channel: Some(false),
            },
            JoinOutcome::Joined(dialog.clone()),
        );
    }
    let invite = h.engine.autojoin.create(&link, None, None).await.expect("create");
    match h.engine.autojoin.join_now(invite.id).await {
        Err(EngineError::RateLimit { seconds }) => assert!(seconds > 0),
        other => panic!("expected rate limit, got {:?}", other.map(|i| i.status)),
    }
}

// S6: a FloodWait mid-backfill pauses at least the advised time and resumes
// from the committed cursor without duplicates.
#[tokio::test]
async fn s6_floodwait_pauses_and_resumes_backfill() {
    let Some(h) = harness().await else { return };

    let (account, rpc) = active_account(&h, "s6").await;
    h.engine.manager.connect(account.id).await.expect("connect");

    let dialog_tg_id = unique_id();
    let dialog = managed_dialog(&h, &account, dialog_tg_id).await;

    // Two pages: 101..=200. The second history call flood-waits.
    let history: Vec<RpcMessage> = (101..=200)
        .map(|id| rpc_message(dialog_tg_id, id, 555, &format!("m{}", id)))
        .collect();
    rpc.set_history(dialog_tg_id, history);
    rpc.pass_next_history();
    rpc.fail_next_history(RpcError::FloodWait { seconds: 2 });

    let started = std::time::Instant::now();
    h.engine.backfill.clone().start(dialog.id).await.expect("start");

    let finished = wait_for(Duration::from_secs(30), || async {
        !h.engine.backfill.is_running(dialog.id).await
    })
    .await;
    assert!(finished, "backfill did not finish");
    assert!(
        started.elapsed() >= Duration::from_secs(2),
        "backfill did not honor the advised wait"
    );

    assert_eq!(message_count(&h, dialog.id).await, 100);

    let mut conn = h.engine.db.get_connection().await.expect("conn");
    let stored = store::dialogs::get(&mut conn, dialog.id)
        .await
        .expect("get")
        .expect("dialog");
    assert_eq!(stored.backfill_cursor, Some(101));
    assert_eq!(stored.status, dialog_status::ACTIVE);
}
