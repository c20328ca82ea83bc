//! Quota-gated unfollow flow: check the window, dispatch, count the success
//! exactly once, record it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{ActionDispatcher, ActionSurface, PacingController, SharedMetrics, StopHandle};
use crate::quota::{Clock, QuotaStore, QuotaTracker, SystemClock};
use crate::state::{HistoryEntry, SqliteStateStore, StateResult};
use crate::users::{IdentitySet, UserRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnfollowReport {
    pub screen_name: String,
    pub success: bool,
    pub hourly_count: u32,
    pub limit: u32,
    pub limit_reached: bool,
    pub reset_in_secs: Option<u64>,
    pub strategy: Option<&'static str>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub reports: Vec<UnfollowReport>,
    pub skipped_whitelisted: usize,
    pub skipped_already_unfollowed: usize,
    pub stopped_at_limit: bool,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|report| report.success).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }
}

pub struct UnfollowSession<Q, C = SystemClock> {
    quota: QuotaTracker<Q, C>,
    dispatcher: ActionDispatcher,
    pacing: PacingController,
    ledger: Option<Arc<SqliteStateStore>>,
    metrics: SharedMetrics,
    stop: StopHandle,
}

impl<Q: QuotaStore, C: Clock> UnfollowSession<Q, C> {
    pub fn new(
        quota: QuotaTracker<Q, C>,
        dispatcher: ActionDispatcher,
        pacing: PacingController,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            quota,
            dispatcher,
            pacing,
            ledger: None,
            metrics,
            stop: StopHandle::new(),
        }
    }

    /// Successful unfollows are appended to this store's history.
    pub fn with_ledger(mut self, ledger: Arc<SqliteStateStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn quota(&self) -> &QuotaTracker<Q, C> {
        &self.quota
    }

    pub fn pacing(&self) -> &PacingController {
        &self.pacing
    }

    /// Ends a running batch before its next action.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn unfollow_one(
        &self,
        surface: &dyn ActionSurface,
        user: &UserRecord,
    ) -> StateResult<UnfollowReport> {
        let limit = self.quota.limit();
        let check = self.quota.is_limit_reached()?;
        if check.reached {
            self.metrics.with(|m| m.record_quota_block());
            let status = self.quota.peek()?;
            info!(
                user = %user.screen_name,
                count = status.count,
                limit,
                "hourly limit reached; skipping unfollow"
            );
            return Ok(UnfollowReport {
                screen_name: user.screen_name.clone(),
                success: false,
                hourly_count: status.count,
                limit,
                limit_reached: true,
                reset_in_secs: check.reset_in.map(|d| d.as_secs()),
                strategy: None,
                error: Some(format!("hourly limit of {limit} unfollows reached")),
            });
        }

        let outcome = self.dispatcher.unfollow(surface, &user.identity()).await;
        if !outcome.success {
            let status = self.quota.peek()?;
            return Ok(UnfollowReport {
                screen_name: user.screen_name.clone(),
                success: false,
                hourly_count: status.count,
                limit,
                limit_reached: status.count >= limit,
                reset_in_secs: status.reset_in.map(|d| d.as_secs()),
                strategy: None,
                error: outcome.error,
            });
        }

        let increment = self.quota.increment()?;
        if let Some(ledger) = &self.ledger {
            let entry = HistoryEntry::for_user(user, outcome.strategy, self.quota.now());
            ledger.record_unfollow(&entry)?;
        }
        if increment.limit_reached {
            warn!(count = increment.count, limit, "hourly limit reached");
        }
        Ok(UnfollowReport {
            screen_name: user.screen_name.clone(),
            success: true,
            hourly_count: increment.count,
            limit,
            limit_reached: increment.limit_reached,
            reset_in_secs: Some(increment.reset_in.as_secs()),
            strategy: outcome.strategy,
            error: None,
        })
    }

    /// Unfollows `users` in order, skipping whitelisted and already
    /// unfollowed accounts, pacing between successful actions and stopping once
    /// the hourly limit is reached.
    pub async fn unfollow_batch(
        &self,
        surface: &dyn ActionSurface,
        users: &[UserRecord],
        whitelist: &IdentitySet,
    ) -> StateResult<BatchReport> {
        self.stop.clear();
        let already_unfollowed = match &self.ledger {
            Some(ledger) => ledger.unfollowed()?,
            None => IdentitySet::new(),
        };

        let mut batch = BatchReport::default();
        let mut pending_wait = false;
        for user in users {
            if whitelist.contains(user) {
                batch.skipped_whitelisted += 1;
                continue;
            }
            if already_unfollowed.contains(user) {
                batch.skipped_already_unfollowed += 1;
                continue;
            }
            if pending_wait {
                self.pacing.wait().await;
            }
            if self.stop.is_stopped() {
                info!(done = batch.reports.len(), "batch stop requested");
                batch.cancelled = true;
                break;
            }

            let report = self.unfollow_one(surface, user).await?;
            pending_wait = report.success;
            let limit_reached = report.limit_reached;
            batch.reports.push(report);
            if limit_reached {
                batch.stopped_at_limit = true;
                break;
            }
        }

        info!(
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            skipped_whitelisted = batch.skipped_whitelisted,
            stopped_at_limit = batch.stopped_at_limit,
            "batch finished"
        );
        Ok(batch)
    }
}
