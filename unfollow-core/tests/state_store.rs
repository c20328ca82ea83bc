use std::path::Path;

use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

use unfollow_core::quota::{QuotaPolicy, QuotaStore, QuotaTracker, QuotaWindow};
use unfollow_core::state::{HistoryEntry, SqliteStateStore, StateError};
use unfollow_core::users::{RelationshipStatus, UserRecord};

fn setup_store(path: &Path, history_limit: usize) -> SqliteStateStore {
    let store = SqliteStateStore::builder()
        .path(path)
        .create_if_missing(true)
        .history_limit(history_limit)
        .build()
        .unwrap();
    store.initialize().unwrap();
    store
}

fn user(id: &str, handle: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        screen_name: handle.to_string(),
        name: handle.to_uppercase(),
        avatar: format!("https://pbs.twimg.com/profile_images/{id}/a_bigger.jpg"),
        followers_count: Some(10),
        following_count: Some(20),
        statuses_count: Some(30),
        is_following_you: false,
        is_blue_verified: true,
        description: "hello".to_string(),
        status: RelationshipStatus::NotFollowingBack,
        incomplete: false,
    }
}

#[test]
fn history_is_newest_first_and_capped() {
    let dir = tempdir().unwrap();
    let store = setup_store(&dir.path().join("state.sqlite"), 3);
    let start = Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap();

    for n in 0..5 {
        let record = user(&format!("{n}"), &format!("user{n}"));
        let entry = HistoryEntry::for_user(&record, Some("api"), start + Duration::minutes(n));
        store.record_unfollow(&entry).unwrap();
    }

    let history = store.history(10).unwrap();
    let handles: Vec<_> = history.iter().map(|e| e.screen_name.as_str()).collect();
    assert_eq!(handles, vec!["user4", "user3", "user2"]);
    assert_eq!(history[0].strategy.as_deref(), Some("api"));
    assert_eq!(history[0].unfollowed_at, start + Duration::minutes(4));
    assert!(history[0].id.is_some());

    let unfollowed = store.unfollowed().unwrap();
    assert!(unfollowed.contains_id("4"));
    assert!(unfollowed.contains(&user("99", "USER3")));
    assert!(!unfollowed.contains_id("0"));
    assert!(!unfollowed.contains(&user("98", "user0")));

    assert_eq!(store.history(1).unwrap().len(), 1);
}

#[test]
fn whitelist_add_is_idempotent_and_removable() {
    let dir = tempdir().unwrap();
    let store = setup_store(&dir.path().join("state.sqlite"), 10);

    assert!(store.whitelist_add("1", "ada").unwrap());
    assert!(!store.whitelist_add("1", "ada").unwrap());
    assert!(store.whitelist_add("2", "bo").unwrap());

    let entries = store.whitelist().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(store.whitelisted().unwrap().contains_id("2"));

    assert!(store.whitelist_remove("1").unwrap());
    assert!(!store.whitelist_remove("1").unwrap());
    let remaining: Vec<_> = store
        .whitelist()
        .unwrap()
        .into_iter()
        .map(|e| e.screen_name)
        .collect();
    assert_eq!(remaining, vec!["bo".to_string()]);
}

#[test]
fn handle_whitelisted_before_scan_covers_resolved_account() {
    let dir = tempdir().unwrap();
    let store = setup_store(&dir.path().join("state.sqlite"), 10);
    store.whitelist_add("alice", "alice").unwrap();

    let whitelisted = store.whitelisted().unwrap();
    assert!(whitelisted.contains(&user("100", "Alice")));
    assert!(!whitelisted.contains(&user("101", "bob")));
}

#[test]
fn scan_cache_keeps_latest_result() {
    let dir = tempdir().unwrap();
    let store = setup_store(&dir.path().join("nested/state.sqlite"), 10);

    assert!(store.cached_scan().unwrap().is_none());
    store.cache_scan("scan-1", &[user("1", "ada")]).unwrap();
    store
        .cache_scan("scan-2", &[user("2", "bo"), user("3", "cy")])
        .unwrap();

    let cached = store.cached_scan().unwrap().unwrap();
    assert_eq!(cached.scan_id, "scan-2");
    assert_eq!(cached.users.len(), 2);
    assert_eq!(cached.users[1], user("3", "cy"));
}

#[test]
fn quota_window_persists_across_store_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.sqlite");
    let store = setup_store(&path, 10);

    assert!(store.load_window().unwrap().is_none());
    let window = QuotaWindow {
        window_start: Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap(),
        count: 7,
    };
    store.save_window(&window).unwrap();

    let reopened = SqliteStateStore::new(&path).unwrap();
    assert_eq!(reopened.load_window().unwrap(), Some(window));
    reopened.clear_window().unwrap();
    assert!(store.load_window().unwrap().is_none());
}

#[test]
fn tracker_counts_through_sqlite_store() {
    let dir = tempdir().unwrap();
    let store = setup_store(&dir.path().join("state.sqlite"), 10);
    let tracker = QuotaTracker::new(
        store.clone(),
        QuotaPolicy {
            limit: 2,
            window: std::time::Duration::from_secs(3600),
        },
    );

    assert_eq!(tracker.peek().unwrap().count, 0);
    assert!(!tracker.increment().unwrap().limit_reached);
    let second = tracker.increment().unwrap();
    assert_eq!(second.count, 2);
    assert!(second.limit_reached);
    assert!(tracker.is_limit_reached().unwrap().reached);
    assert_eq!(store.load_window().unwrap().unwrap().count, 2);
}

#[test]
fn builder_without_path_is_rejected() {
    let err = SqliteStateStore::builder().build().unwrap_err();
    assert!(matches!(err, StateError::MissingStore));
}
