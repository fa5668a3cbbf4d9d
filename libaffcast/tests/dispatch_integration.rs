//! Integration tests for the dispatcher and manual override
//!
//! Runs against a file-backed SQLite database with mock publishers.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use libaffcast::dispatch::POST_NOT_FOUND;
use libaffcast::error::PlatformError;
use libaffcast::platforms::{MockPublisher, Publishers};
use libaffcast::{
    AffcastError, Database, Dispatcher, NewPost, NewQueueEntry, Platform, QueuePlatform,
    QueueStatus,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("affcast.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    (db, temp_dir)
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

async fn post(db: &Database, pattern: &str) -> i64 {
    let new = NewPost::new(
        pattern,
        &format!("{} for X", pattern),
        &format!("{} for IG", pattern),
    );
    db.create_post(&new).await.unwrap().id
}

async fn enqueue(db: &Database, post_id: i64, platform: QueuePlatform, at: NaiveDateTime) -> i64 {
    db.add(&NewQueueEntry::new(post_id, platform, at))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_both_partial_failure_keeps_successful_id() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "review").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::Both, now() - Duration::minutes(1)).await;

    let x = MockPublisher::success(Platform::X, "t123");
    let ig = MockPublisher::failure(
        Platform::Instagram,
        PlatformError::RateLimit("rate limited".to_string()),
    );
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()).with(ig));

    let report = dispatcher.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.failed, 1);
    assert!(report.has_failures());

    let entry = db.get_entry(queue_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry.error_msg.as_deref().unwrap().contains("IG: rate limited"));
    assert!(entry.posted_at.is_none());
    assert_eq!(entry.external_id(Platform::X), Some("t123"));
    assert_eq!(entry.external_id(Platform::Instagram), None);

    let stored = db.get_post(post_id).await.unwrap().unwrap();
    assert_eq!(stored.tweet_id.as_deref(), Some("t123"));
    assert!(stored.ig_media_id.is_none());
    assert_eq!(x.published(), vec![("review for X".to_string(), None)]);
}

#[tokio::test]
async fn test_manual_retry_only_addresses_remaining_platform() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "retry").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::Both, now() - Duration::minutes(1)).await;

    let x = MockPublisher::success(Platform::X, "t123");
    let failing_ig = MockPublisher::failure(
        Platform::Instagram,
        PlatformError::Network("timed out".to_string()),
    );
    Dispatcher::new(db.clone(), Publishers::new().with(x.clone()).with(failing_ig))
        .run_cycle_at(now())
        .await
        .unwrap();

    // Failed entries are not picked up by later cycles
    let ig = MockPublisher::success(Platform::Instagram, "m456");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()).with(ig.clone()));
    let report = dispatcher.run_cycle_at(now() + Duration::hours(1)).await.unwrap();
    assert_eq!(report.due, 0);

    let outcome = dispatcher.publish_now(queue_id, false).await.unwrap();
    assert!(outcome.is_posted());
    assert_eq!(x.publish_call_count(), 1);
    assert_eq!(ig.publish_call_count(), 1);

    let entry = db.get_entry(queue_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Posted);
    assert!(entry.error_msg.is_none());
    assert!(entry.posted_at.is_some());

    let stored = db.get_post(post_id).await.unwrap().unwrap();
    assert_eq!(stored.tweet_id.as_deref(), Some("t123"));
    assert_eq!(stored.ig_media_id.as_deref(), Some("m456"));
}

#[tokio::test]
async fn test_dangling_post_reference_fails_without_calls() {
    let (db, _temp_dir) = setup_db().await;
    let queue_id = enqueue(&db, 999, QueuePlatform::X, now() - Duration::minutes(1)).await;

    let x = MockPublisher::success(Platform::X, "t1");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()));
    let report = dispatcher.run_cycle_at(now()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(x.publish_call_count(), 0);

    let entry = db.get_entry(queue_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.error_msg.as_deref(), Some(POST_NOT_FOUND));
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "dry").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::Both, now() - Duration::minutes(1)).await;
    let dangling = enqueue(&db, 999, QueuePlatform::X, now() - Duration::minutes(1)).await;

    let x = MockPublisher::success(Platform::X, "t1");
    let ig = MockPublisher::success(Platform::Instagram, "m1");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()).with(ig.clone()))
        .with_dry_run(true);

    let report = dispatcher.run_cycle_at(now()).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.due, 2);
    assert_eq!(report.skipped, 2);
    assert!(!report.has_failures());

    assert_eq!(x.publish_call_count(), 0);
    assert_eq!(ig.publish_call_count(), 0);
    for id in [queue_id, dangling] {
        let entry = db.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);
        assert!(entry.error_msg.is_none());
    }
    assert!(!db.get_post(post_id).await.unwrap().unwrap().is_published());
}

#[tokio::test]
async fn test_cycle_is_idempotent() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "once").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::X, now() - Duration::minutes(1)).await;

    let x = MockPublisher::success(Platform::X, "t1");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()));

    let first = dispatcher.run_cycle_at(now()).await.unwrap();
    let after_first = db.get_entry(queue_id).await.unwrap().unwrap();
    let second = dispatcher
        .run_cycle_at(now() + Duration::minutes(5))
        .await
        .unwrap();
    let after_second = db.get_entry(queue_id).await.unwrap().unwrap();

    assert_eq!(first.posted, 1);
    assert_eq!(second.due, 0);
    assert_eq!(x.publish_call_count(), 1);

    assert_eq!(after_second.status, QueueStatus::Posted);
    assert!(after_first.posted_at.is_some());
    assert_eq!(after_second.posted_at, after_first.posted_at);
    assert!(after_second.error_msg.is_none());
    assert_eq!(after_second.error_msg, after_first.error_msg);
    assert_eq!(after_second.tweet_id, after_first.tweet_id);
}

#[tokio::test]
async fn test_repeat_schedules_of_one_post_each_publish() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "twice").await;
    let morning = now() - Duration::hours(3);
    let evening = now() + Duration::hours(5);
    let first = enqueue(&db, post_id, QueuePlatform::X, morning).await;
    let second = enqueue(&db, post_id, QueuePlatform::X, evening).await;

    let x = MockPublisher::success(Platform::X, "t1");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()));

    let report = dispatcher
        .run_cycle_at(morning + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(report.posted, 1);
    assert_eq!(x.publish_call_count(), 1);

    let report = dispatcher
        .run_cycle_at(evening + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(report.posted, 1);
    assert_eq!(x.publish_call_count(), 2);

    for id in [first, second] {
        let entry = db.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Posted);
        assert_eq!(entry.external_id(Platform::X), Some("t1"));
    }
}

#[tokio::test]
async fn test_publish_now_ignores_ids_from_other_entries() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "repost").await;
    let earlier = enqueue(&db, post_id, QueuePlatform::X, now() - Duration::hours(1)).await;
    let fresh = enqueue(&db, post_id, QueuePlatform::X, now() + Duration::days(1)).await;

    let x = MockPublisher::success(Platform::X, "t1");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()));
    dispatcher.publish_now(earlier, false).await.unwrap();

    let outcome = dispatcher.publish_now(fresh, false).await.unwrap();
    assert!(outcome.is_posted());
    assert!(!outcome.attempts[0].reused);
    assert_eq!(x.publish_call_count(), 2);
}

#[tokio::test]
async fn test_future_entries_wait() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "later").await;
    let far = NaiveDate::from_ymd_opt(2099, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let queue_id = enqueue(&db, post_id, QueuePlatform::X, far).await;

    let x = MockPublisher::success(Platform::X, "t1");
    let report = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()))
        .run_cycle_at(now())
        .await
        .unwrap();

    assert_eq!(report.due, 0);
    assert_eq!(x.publish_call_count(), 0);
    assert_eq!(
        db.get_entry(queue_id).await.unwrap().unwrap().status,
        QueueStatus::Pending
    );
}

#[tokio::test]
async fn test_due_entries_are_delivered_in_schedule_order() {
    let (db, _temp_dir) = setup_db().await;
    let later = post(&db, "second").await;
    let earlier = post(&db, "first").await;
    enqueue(&db, later, QueuePlatform::X, now() - Duration::minutes(5)).await;
    enqueue(&db, earlier, QueuePlatform::X, now() - Duration::minutes(10)).await;
    // Exactly at the boundary is due
    let boundary = post(&db, "third").await;
    enqueue(&db, boundary, QueuePlatform::X, now()).await;

    let x = MockPublisher::success(Platform::X, "t");
    let report = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()))
        .run_cycle_at(now())
        .await
        .unwrap();

    assert_eq!(report.posted, 3);
    let order: Vec<String> = x.published().into_iter().map(|(content, _)| content).collect();
    assert_eq!(order, vec!["first for X", "second for X", "third for X"]);
}

#[tokio::test]
async fn test_missing_credentials_do_not_block_other_platform() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "creds").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::Both, now() - Duration::minutes(1)).await;

    let x = MockPublisher::without_credentials(Platform::X);
    let ig = MockPublisher::success(Platform::Instagram, "m1");
    Dispatcher::new(db.clone(), Publishers::new().with(x.clone()).with(ig.clone()))
        .run_cycle_at(now())
        .await
        .unwrap();

    assert_eq!(x.publish_call_count(), 0);
    assert_eq!(ig.published(), vec![("creds for IG".to_string(), None)]);

    let entry = db.get_entry(queue_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.error_msg.as_deref(), Some("X: credentials missing"));
    assert_eq!(
        db.get_post(post_id).await.unwrap().unwrap().ig_media_id.as_deref(),
        Some("m1")
    );
}

#[tokio::test]
async fn test_publish_now_reaches_facebook() {
    let (db, _temp_dir) = setup_db().await;
    let mut new = NewPost::new("fb", "x text", "page text");
    new.image_url = Some("https://cdn.example.com/item.jpg".to_string());
    let post_id = db.create_post(&new).await.unwrap().id;
    let far = now() + Duration::days(30);
    let queue_id = enqueue(&db, post_id, QueuePlatform::Facebook, far).await;

    let fb = MockPublisher::success(Platform::Facebook, "1234_555");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(fb.clone()));
    let outcome = dispatcher.publish_now(queue_id, false).await.unwrap();

    assert!(outcome.is_posted());
    assert_eq!(outcome.external_ids(), vec![(Platform::Facebook, "1234_555")]);
    assert_eq!(
        fb.published(),
        vec![(
            "page text".to_string(),
            Some("https://cdn.example.com/item.jpg".to_string())
        )]
    );

    let stored = db.get_post(post_id).await.unwrap().unwrap();
    assert_eq!(stored.fb_post_id.as_deref(), Some("1234_555"));
    assert_eq!(
        db.get_entry(queue_id).await.unwrap().unwrap().status,
        QueueStatus::Posted
    );
}

#[tokio::test]
async fn test_publish_now_overwrites_failed_status() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "again").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::X, now()).await;
    db.update_status(queue_id, QueueStatus::Failed, Some("X: boom"), None)
        .await
        .unwrap();

    let failing = MockPublisher::failure(
        Platform::X,
        PlatformError::Authentication("Unauthorized".to_string()),
    );
    let outcome = Dispatcher::new(db.clone(), Publishers::new().with(failing))
        .publish_now(queue_id, false)
        .await
        .unwrap();

    assert_eq!(outcome.error(), Some("X: Unauthorized"));
    let entry = db.get_entry(queue_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.error_msg.as_deref(), Some("X: Unauthorized"));
}

#[tokio::test]
async fn test_publish_now_force_republishes() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "force").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::X, now()).await;
    db.stamp_external_id(post_id, Platform::X, "old").await.unwrap();
    db.stamp_entry_external_id(queue_id, Platform::X, "old").await.unwrap();

    let x = MockPublisher::success(Platform::X, "new");
    let dispatcher = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()));

    let reused = dispatcher.publish_now(queue_id, false).await.unwrap();
    assert!(reused.attempts[0].reused);
    assert_eq!(x.publish_call_count(), 0);

    let forced = dispatcher.publish_now(queue_id, true).await.unwrap();
    assert!(!forced.attempts[0].reused);
    assert_eq!(x.publish_call_count(), 1);
    assert_eq!(
        db.get_post(post_id).await.unwrap().unwrap().tweet_id.as_deref(),
        Some("new")
    );
    assert_eq!(
        db.get_entry(queue_id).await.unwrap().unwrap().tweet_id.as_deref(),
        Some("new")
    );
}

#[tokio::test]
async fn test_publish_now_unknown_entry() {
    let (db, _temp_dir) = setup_db().await;
    let result = Dispatcher::new(db, Publishers::new()).publish_now(42, false).await;

    match result {
        Err(e @ AffcastError::InvalidInput(_)) => assert_eq!(e.exit_code(), 3),
        other => panic!("expected invalid input, got {:?}", other.map(|o| o.queue_id)),
    }
}

#[tokio::test]
async fn test_publish_now_dangling_post() {
    let (db, _temp_dir) = setup_db().await;
    let queue_id = enqueue(&db, 999, QueuePlatform::Instagram, now()).await;

    let outcome = Dispatcher::new(db.clone(), Publishers::new())
        .publish_now(queue_id, false)
        .await
        .unwrap();

    assert_eq!(outcome.error(), Some(POST_NOT_FOUND));
    assert_eq!(
        db.get_entry(queue_id).await.unwrap().unwrap().error_msg.as_deref(),
        Some(POST_NOT_FOUND)
    );
}

#[tokio::test]
async fn test_deleted_entry_is_never_dispatched() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = post(&db, "gone").await;
    let queue_id = enqueue(&db, post_id, QueuePlatform::X, now() - Duration::minutes(1)).await;

    assert!(db.delete(queue_id).await.unwrap());
    assert!(!db.delete(queue_id).await.unwrap());

    let x = MockPublisher::success(Platform::X, "t1");
    let report = Dispatcher::new(db.clone(), Publishers::new().with(x.clone()))
        .run_cycle_at(now())
        .await
        .unwrap();

    assert_eq!(report.due, 0);
    assert_eq!(x.publish_call_count(), 0);
    assert!(db.get_post(post_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("affcast.db");
    let path = db_path.to_str().unwrap();

    let queue_id = {
        let db = Database::new(path).await.unwrap();
        let post_id = post(&db, "durable").await;
        let id = enqueue(&db, post_id, QueuePlatform::X, now() - Duration::minutes(1)).await;
        Dispatcher::new(db.clone(), Publishers::new().with(MockPublisher::success(Platform::X, "t9")))
            .run_cycle_at(now())
            .await
            .unwrap();
        db.close().await;
        id
    };

    let db = Database::new(path).await.unwrap();
    let entry = db.get_entry(queue_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Posted);
    assert_eq!(
        db.get_post(entry.post_id).await.unwrap().unwrap().tweet_id.as_deref(),
        Some("t9")
    );
}
