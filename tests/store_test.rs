//! Persistence adapter behavior against a real database. Skips when
//! TEST_DATABASE_URL is not set.

mod common;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use telegram_indexer::models::dialog::{kind, status as dialog_status, NewDialog};
use telegram_indexer::models::media::{processing, validation, NewMediaFile};
use telegram_indexer::models::message::NewMessage;
use telegram_indexer::models::profile_photo::NewProfilePhoto;
use telegram_indexer::models::user::NewUser;
use telegram_indexer::schema::profile_photos;
use telegram_indexer::store;
use telegram_indexer::store::messages::UpsertOutcome;

use common::{harness, unique_id};

async fn make_dialog(h: &common::TestHarness) -> i32 {
    let mut conn = h.engine.db.get_connection().await.expect("conn");
    store::dialogs::upsert(
        &mut conn,
        &NewDialog {
            telegram_id: unique_id(),
            dialog_type: kind::GROUP.to_string(),
            title: Some("store test".into()),
            username: None,
            member_count: None,
            account_id: None,
            status: dialog_status::INACTIVE.to_string(),
            download_media: true,
            backfill_enabled: true,
            is_monitoring: false,
        },
    )
    .await
    .expect("dialog")
    .id
}

fn message_row(dialog_id: i32, telegram_message_id: i64) -> NewMessage {
    NewMessage {
        telegram_message_id,
        dialog_id,
        user_id: None,
        date: chrono::Utc::now().naive_utc(),
        text: Some("hello".into()),
        reply_to_message_id: None,
        grouped_id: None,
        views: None,
        forwards: None,
        reactions: None,
        media_type: None,
        has_media: false,
    }
}

#[tokio::test]
async fn message_upsert_is_idempotent() {
    let Some(h) = harness().await else { return };
    let dialog_id = make_dialog(&h).await;
    let mut conn = h.engine.db.get_connection().await.expect("conn");

    let row = message_row(dialog_id, 42);
    let first = store::messages::upsert(&mut conn, &row).await.expect("first");
    let id = match first {
        UpsertOutcome::Inserted(id) => id,
        UpsertOutcome::Existed => panic!("fresh row reported as existing"),
    };

    // Replay with different mutable fields: the original row wins.
    let mut replay = message_row(dialog_id, 42);
    replay.text = Some("rewritten".into());
    let second = store::messages::upsert(&mut conn, &replay).await.expect("second");
    assert_eq!(second, UpsertOutcome::Existed);

    let stored = store::messages::get(&mut conn, id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(stored.text.as_deref(), Some("hello"));
}

#[tokio::test]
async fn batch_insert_reports_only_new_rows() {
    let Some(h) = harness().await else { return };
    let dialog_id = make_dialog(&h).await;
    let mut conn = h.engine.db.get_connection().await.expect("conn");

    let batch: Vec<NewMessage> = (1..=10).map(|id| message_row(dialog_id, id)).collect();
    let inserted = store::messages::insert_batch(&mut conn, &batch).await.expect("batch");
    assert_eq!(inserted.len(), 10);

    // Overlapping batch: only the unseen half inserts.
    let batch: Vec<NewMessage> = (6..=15).map(|id| message_row(dialog_id, id)).collect();
    let inserted = store::messages::insert_batch(&mut conn, &batch).await.expect("batch");
    let new_ids: Vec<i64> = inserted.iter().map(|(_, tg)| *tg).collect();
    assert_eq!(inserted.len(), 5);
    assert!(new_ids.iter().all(|id| *id >= 11));
}

#[tokio::test]
async fn identity_change_is_logged_on_username_move() {
    let Some(h) = harness().await else { return };
    let mut conn = h.engine.db.get_connection().await.expect("conn");

    let tg_id = unique_id();
    let mut user = NewUser::stub(tg_id);
    user.username = Some("alpha".into());
    let user_id = store::users::upsert_full(&mut conn, &user).await.expect("insert");

    // No-op update: same identity, no log row.
    store::users::upsert_full(&mut conn, &user).await.expect("same");
    assert!(store::users::identity_history(&mut conn, user_id)
        .await
        .expect("history")
        .is_empty());

    user.username = Some("beta".into());
    store::users::upsert_full(&mut conn, &user).await.expect("rename");

    let history = store::users::identity_history(&mut conn, user_id)
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].field, "username");
    assert_eq!(history[0].old_value.as_deref(), Some("alpha"));
    assert_eq!(history[0].new_value.as_deref(), Some("beta"));

    let stored = store::users::get(&mut conn, user_id)
        .await
        .expect("get")
        .expect("user");
    assert_eq!(stored.username.as_deref(), Some("beta"));
}

#[tokio::test]
async fn media_insert_allows_nil_to_hashed_transition_only() {
    let Some(h) = harness().await else { return };
    let dialog_id = make_dialog(&h).await;
    let mut conn = h.engine.db.get_connection().await.expect("conn");

    let row = message_row(dialog_id, 77);
    let message_id = store::messages::upsert(&mut conn, &row)
        .await
        .expect("message")
        .inserted_id()
        .expect("inserted");

    let media = NewMediaFile {
        message_id,
        dialog_id,
        telegram_message_id: 77,
        file_type: "photo".into(),
        file_name: None,
        file_size: None,
        mime_type: None,
        content_hash: None,
        validation_status: validation::PENDING.to_string(),
        processing_status: processing::QUEUED.to_string(),
        processing_priority: 0,
    };
    let media_id = store::media::insert(&mut conn, &media)
        .await
        .expect("insert")
        .expect("id");

    // Re-insert without a hash: no-op.
    let again = store::media::insert(&mut conn, &media).await.expect("again");
    assert!(again.is_none());

    // Re-insert with a hash: the hash lands without clobbering the row.
    let mut hashed = media;
    hashed.content_hash = Some("cafe".repeat(16));
    let updated = store::media::insert(&mut conn, &hashed).await.expect("hashed");
    assert_eq!(updated, Some(media_id));

    let stored = store::media::get(&mut conn, media_id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(stored.content_hash.as_deref(), Some("cafecafecafecafecafecafecafecafecafecafecafecafecafecafecafecafe"));
}

#[tokio::test]
async fn one_current_profile_photo_per_user() {
    let Some(h) = harness().await else { return };
    let mut conn = h.engine.db.get_connection().await.expect("conn");

    let user_id = store::users::upsert_stub(&mut conn, unique_id()).await.expect("user");

    for photo_id in [10i64, 20, 30] {
        store::profile_photos::insert(
            &mut conn,
            &NewProfilePhoto {
                user_id,
                telegram_photo_id: photo_id,
                is_current: false,
                is_video: false,
                captured_at: None,
                file_path: None,
            },
        )
        .await
        .expect("photo");
        store::profile_photos::set_current(&mut conn, user_id, photo_id)
            .await
            .expect("flip");

        let current: i64 = profile_photos::table
            .filter(profile_photos::user_id.eq(user_id))
            .filter(profile_photos::is_current.eq(true))
            .count()
            .get_result(&mut conn)
            .await
            .expect("count");
        assert_eq!(current, 1);
    }

    let photos = store::profile_photos::for_user(&mut conn, user_id)
        .await
        .expect("photos");
    let current: Vec<i64> = photos
        .iter()
        .filter(|p| p.is_current)
        .map(|p| p.telegram_photo_id)
        .collect();
    assert_eq!(current, vec![30]);
}

#[tokio::test]
async fn detection_rows_are_unique_per_match() {
    let Some(h) = harness().await else { return };
    let dialog_id = make_dialog(&h).await;
    let mut conn = h.engine.db.get_connection().await.expect("conn");

    let row = message_row(dialog_id, 99);
    let message_id = store::messages::upsert(&mut conn, &row)
        .await
        .expect("message")
        .inserted_id()
        .expect("inserted");

    let detectors = store::detections::active_detectors(&mut conn).await.expect("detectors");
    let email = detectors
        .iter()
        .find(|d| d.name == "Email Standard")
        .expect("builtin email detector");

    let rows = vec![telegram_indexer::models::detection::NewDetection {
        message_id,
        detector_id: email.id,
        detection_type: "email".into(),
        matched_text: "bob@example.com".into(),
        normalized_value: "bob@example.com".into(),
        context_before: None,
        context_after: None,
    }];

    let first = store::detections::insert_batch(&mut conn, &rows).await.expect("first");
    assert_eq!(first, 1);
    // Running the same extraction again inserts nothing.
    let second = store::detections::insert_batch(&mut conn, &rows).await.expect("second");
    assert_eq!(second, 0);

    let stored = store::detections::for_message(&mut conn, message_id)
        .await
        .expect("rows");
    assert_eq!(stored.len(), 1);
}
