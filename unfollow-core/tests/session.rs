use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::tempdir;

use unfollow_core::browser::{
    ActionDispatcher, ActionSurface, BrowserError, BrowserResult, PacingConfig, PacingController,
    SharedMetrics, StopHandle, UnfollowStrategy,
};
use unfollow_core::quota::{MemoryQuotaStore, QuotaPolicy, QuotaTracker};
use unfollow_core::session::UnfollowSession;
use unfollow_core::state::{HistoryEntry, SqliteStateStore};
use unfollow_core::users::{DomEntry, IdentitySet, UserIdentity, UserRecord};

struct IdleSurface;

#[async_trait(?Send)]
impl ActionSurface for IdleSurface {
    async fn cookie(&self, _name: &str) -> BrowserResult<Option<String>> {
        Ok(None)
    }

    async fn post_form(
        &self,
        _url: &str,
        _headers: &[(String, String)],
        _body: &str,
    ) -> BrowserResult<u16> {
        Ok(500)
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok("https://x.com/me/following".into())
    }

    async fn navigate(&self, _url: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn click_in_entry(&self, _: &str, _: &[String]) -> BrowserResult<bool> {
        Ok(false)
    }

    async fn click_first(&self, _: &[String]) -> BrowserResult<bool> {
        Ok(false)
    }
}

/// Succeeds for every handle except the rejected ones and records calls.
#[derive(Default, Clone)]
struct ScriptedStrategy {
    rejected: Rc<HashSet<String>>,
    calls: Rc<RefCell<Vec<String>>>,
    stop_after_first: Rc<RefCell<Option<StopHandle>>>,
}

#[async_trait(?Send)]
impl UnfollowStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn attempt(
        &self,
        _surface: &dyn ActionSurface,
        target: &UserIdentity,
    ) -> BrowserResult<()> {
        self.calls.borrow_mut().push(target.screen_name.clone());
        if let Some(handle) = self.stop_after_first.borrow_mut().take() {
            handle.stop();
        }
        if self.rejected.contains(&target.screen_name) {
            Err(BrowserError::Script("button missing".into()))
        } else {
            Ok(())
        }
    }
}

fn user(handle: &str) -> UserRecord {
    UserRecord::from_dom(DomEntry {
        screen_name: handle.to_string(),
        ..Default::default()
    })
}

fn pacing() -> PacingController {
    PacingController::with_seed(
        PacingConfig {
            min_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(3_000),
            batch_size: 50,
            batch_pause: Duration::from_secs(60),
        },
        11,
    )
}

fn session(
    limit: u32,
    strategy: &ScriptedStrategy,
    metrics: &SharedMetrics,
) -> UnfollowSession<MemoryQuotaStore> {
    let quota = QuotaTracker::new(
        MemoryQuotaStore::new(),
        QuotaPolicy {
            limit,
            window: Duration::from_secs(3600),
        },
    );
    let dispatcher =
        ActionDispatcher::with_strategies(vec![Box::new(strategy.clone())], metrics.clone());
    UnfollowSession::new(quota, dispatcher, pacing(), metrics.clone())
}

fn rejecting(handles: &[&str]) -> ScriptedStrategy {
    ScriptedStrategy {
        rejected: Rc::new(handles.iter().map(|h| h.to_string()).collect()),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn only_successful_unfollows_count_against_quota() {
    let strategy = rejecting(&["bad"]);
    let metrics = SharedMetrics::new();
    let session = session(100, &strategy, &metrics);

    let ok = session.unfollow_one(&IdleSurface, &user("good")).await.unwrap();
    assert!(ok.success);
    assert_eq!(ok.hourly_count, 1);
    assert_eq!(ok.strategy, Some("scripted"));
    assert_eq!(ok.reset_in_secs, Some(3600));

    let failed = session.unfollow_one(&IdleSurface, &user("bad")).await.unwrap();
    assert!(!failed.success);
    assert_eq!(failed.hourly_count, 1);
    assert!(!failed.limit_reached);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .starts_with("could not unfollow @bad"));
    assert_eq!(session.quota().peek().unwrap().count, 1);
}

#[tokio::test(start_paused = true)]
async fn reached_limit_blocks_without_dispatching() {
    let strategy = rejecting(&[]);
    let metrics = SharedMetrics::new();
    let session = session(2, &strategy, &metrics);

    session.unfollow_one(&IdleSurface, &user("a")).await.unwrap();
    let second = session.unfollow_one(&IdleSurface, &user("b")).await.unwrap();
    assert!(second.success);
    assert!(second.limit_reached);

    let blocked = session.unfollow_one(&IdleSurface, &user("c")).await.unwrap();
    assert!(!blocked.success);
    assert!(blocked.limit_reached);
    assert_eq!(blocked.hourly_count, 2);
    assert_eq!(
        blocked.error.as_deref(),
        Some("hourly limit of 2 unfollows reached")
    );
    assert_eq!(strategy.calls.borrow().as_slice(), ["a", "b"]);
    assert_eq!(metrics.snapshot().quota_blocks, 1);
}

#[tokio::test(start_paused = true)]
async fn batch_skips_protected_users_and_stops_at_limit() {
    let dir = tempdir().unwrap();
    let ledger = SqliteStateStore::builder()
        .path(dir.path().join("state.sqlite"))
        .build()
        .unwrap();
    ledger.initialize().unwrap();
    ledger
        .record_unfollow(&HistoryEntry::for_user(&user("gone"), Some("api"), Utc::now()))
        .unwrap();
    let ledger = Arc::new(ledger);

    let strategy = rejecting(&["bad"]);
    let metrics = SharedMetrics::new();
    let session = session(3, &strategy, &metrics).with_ledger(Arc::clone(&ledger));

    let users: Vec<_> = ["a", "friend", "gone", "b", "bad", "c", "d"]
        .into_iter()
        .map(user)
        .collect();
    let whitelist: IdentitySet = [("friend", "friend")].into_iter().collect();

    let batch = session
        .unfollow_batch(&IdleSurface, &users, &whitelist)
        .await
        .unwrap();

    assert_eq!(batch.skipped_whitelisted, 1);
    assert_eq!(batch.skipped_already_unfollowed, 1);
    assert!(batch.stopped_at_limit);
    assert!(!batch.cancelled);
    assert_eq!(batch.succeeded(), 3);
    assert_eq!(batch.failed(), 1);
    assert_eq!(strategy.calls.borrow().as_slice(), ["a", "b", "bad", "c"]);

    // waits follow successes only: before "b" and before "bad"
    assert_eq!(session.pacing().state().action_count, 2);

    let history: Vec<_> = ledger
        .history(10)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.screen_name, entry.strategy))
        .collect();
    assert_eq!(
        history,
        vec![
            ("c".to_string(), Some("scripted".to_string())),
            ("b".to_string(), Some("scripted".to_string())),
            ("a".to_string(), Some("scripted".to_string())),
            ("gone".to_string(), Some("api".to_string())),
        ]
    );
}

fn resolved(id: &str, handle: &str) -> UserRecord {
    let mut record = user(handle);
    record.id = id.to_string();
    record.incomplete = false;
    record
}

#[tokio::test(start_paused = true)]
async fn handle_entries_still_protect_accounts_after_rescan() {
    let dir = tempdir().unwrap();
    let ledger = SqliteStateStore::builder()
        .path(dir.path().join("state.sqlite"))
        .build()
        .unwrap();
    ledger.initialize().unwrap();
    ledger.whitelist_add("alice", "alice").unwrap();
    ledger
        .record_unfollow(&HistoryEntry::for_user(&user("gone"), Some("profile-page"), Utc::now()))
        .unwrap();
    let whitelist = ledger.whitelisted().unwrap();
    let ledger = Arc::new(ledger);

    let strategy = rejecting(&[]);
    let metrics = SharedMetrics::new();
    let session = session(100, &strategy, &metrics).with_ledger(Arc::clone(&ledger));

    let users = vec![resolved("100", "Alice"), resolved("200", "gone"), resolved("300", "dan")];
    let batch = session
        .unfollow_batch(&IdleSurface, &users, &whitelist)
        .await
        .unwrap();

    assert_eq!(batch.skipped_whitelisted, 1);
    assert_eq!(batch.skipped_already_unfollowed, 1);
    assert_eq!(strategy.calls.borrow().as_slice(), ["dan"]);
}

#[tokio::test(start_paused = true)]
async fn stop_request_ends_batch_before_next_action() {
    let strategy = rejecting(&[]);
    let metrics = SharedMetrics::new();
    let session = session(100, &strategy, &metrics);
    *strategy.stop_after_first.borrow_mut() = Some(session.stop_handle());

    let users: Vec<_> = ["a", "b", "c"].into_iter().map(user).collect();
    let batch = session
        .unfollow_batch(&IdleSurface, &users, &IdentitySet::new())
        .await
        .unwrap();

    assert!(batch.cancelled);
    assert_eq!(batch.reports.len(), 1);
    assert_eq!(strategy.calls.borrow().as_slice(), ["a"]);
    assert_eq!(session.quota().peek().unwrap().count, 1);
}
