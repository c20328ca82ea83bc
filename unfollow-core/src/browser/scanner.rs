use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScanSection;
use crate::users::{DomEntry, MergeOutcome, UserRecord, UserRoster};

use super::error::{BrowserError, BrowserResult};
use super::extractor::extract_users;
use super::interceptor::ResponseInterceptor;
use super::metrics::SharedMetrics;

const MAX_PROGRESS: u8 = 95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub settle: Duration,
    pub scroll_interval: Duration,
    pub max_iterations: usize,
    pub max_stable_iterations: usize,
    pub intercept_pattern: String,
    pub queue_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(2_000),
            scroll_interval: Duration::from_millis(1_500),
            max_iterations: 200,
            max_stable_iterations: 5,
            intercept_pattern: "/following".to_string(),
            queue_capacity: 256,
        }
    }
}

impl From<&ScanSection> for ScanConfig {
    fn from(section: &ScanSection) -> Self {
        Self {
            settle: Duration::from_millis(section.settle_ms),
            scroll_interval: Duration::from_millis(section.scroll_interval_ms),
            max_iterations: section.max_iterations,
            max_stable_iterations: section.max_stable_iterations.max(1),
            intercept_pattern: section.intercept_pattern.clone(),
            queue_capacity: section.queue_capacity.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
    Complete,
    Stopped,
    Error,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Scanning => "scanning",
            ScanState::Complete => "complete",
            ScanState::Stopped => "stopped",
            ScanState::Error => "error",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress {
        loaded: usize,
        total: Option<usize>,
        percentage: u8,
    },
    Complete {
        users: Vec<UserRecord>,
    },
    Error {
        error: String,
    },
}

/// The page the scan drives: identity lookup, the rendered list and the
/// pagination trigger.
#[async_trait(?Send)]
pub trait ScanSurface {
    /// Handle of the signed-in account, if it can be determined.
    async fn current_identity(&mut self) -> BrowserResult<Option<String>>;
    async fn open_following(&mut self, screen_name: &str) -> BrowserResult<()>;
    async fn snapshot(&mut self) -> BrowserResult<Vec<DomEntry>>;
    async fn advance(&mut self) -> BrowserResult<()>;
    async fn content_height(&mut self) -> BrowserResult<u64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanTally {
    pub payloads: u64,
    pub api_records: u64,
    pub dom_records: u64,
    pub upgraded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub scan_id: Uuid,
    pub state: ScanState,
    pub iterations: usize,
    pub tally: ScanTally,
    pub users: Vec<UserRecord>,
}

/// Cooperative cancellation flag, checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Walks the following list page by page and reconciles network-derived and
/// rendered entries into one ordered, deduplicated list.
#[derive(Debug)]
pub struct ReconcilingScanner {
    config: ScanConfig,
    state: Mutex<ScanState>,
    stop: StopHandle,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
    metrics: SharedMetrics,
}

struct ScanRun {
    roster: UserRoster,
    tally: ScanTally,
    iterations: usize,
    stopped: bool,
}

impl ReconcilingScanner {
    pub fn new(config: ScanConfig, metrics: SharedMetrics) -> Self {
        Self {
            config,
            state: Mutex::new(ScanState::Idle),
            stop: StopHandle::new(),
            events: None,
            metrics,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        *self.lock_state()
    }

    /// Stops the running scan after its current iteration.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn scan(
        &self,
        surface: &mut dyn ScanSurface,
        interceptor: &dyn ResponseInterceptor,
    ) -> BrowserResult<ScanOutcome> {
        let mut guard = self.begin()?;
        let scan_id = Uuid::new_v4();
        self.metrics.with(|m| m.record_scan_start());
        info!(%scan_id, "scan started");

        match self.run(surface, interceptor).await {
            Ok(run) => {
                let state = if run.stopped {
                    ScanState::Stopped
                } else {
                    ScanState::Complete
                };
                guard.finish(state);
                let users = run.roster.into_users();
                info!(
                    %scan_id,
                    state = %state,
                    users = users.len(),
                    iterations = run.iterations,
                    upgraded = run.tally.upgraded,
                    "scan finished"
                );
                self.emit(ScanEvent::Complete {
                    users: users.clone(),
                });
                Ok(ScanOutcome {
                    scan_id,
                    state,
                    iterations: run.iterations,
                    tally: run.tally,
                    users,
                })
            }
            Err(err) => {
                guard.finish(ScanState::Error);
                warn!(%scan_id, error = %err, "scan failed");
                self.emit(ScanEvent::Error {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn begin(&self) -> BrowserResult<ScanGuard<'_>> {
        let mut state = self.lock_state();
        if *state == ScanState::Scanning {
            return Err(BrowserError::ScanInProgress);
        }
        *state = ScanState::Scanning;
        self.stop.clear();
        Ok(ScanGuard {
            state: &self.state,
            finished: false,
        })
    }

    async fn run(
        &self,
        surface: &mut dyn ScanSurface,
        interceptor: &dyn ResponseInterceptor,
    ) -> BrowserResult<ScanRun> {
        let identity = surface
            .current_identity()
            .await?
            .map(|name| name.trim().trim_start_matches('@').to_string())
            .filter(|name| !name.is_empty())
            .ok_or(BrowserError::MissingIdentity)?;
        debug!(account = %identity, "resolved signed-in account");

        let (sink, mut queue) = mpsc::channel(self.config.queue_capacity.max(1));
        let _subscription = interceptor
            .subscribe(&self.config.intercept_pattern, sink)
            .await?;

        surface.open_following(&identity).await?;
        sleep(self.config.settle).await;

        let mut run = ScanRun {
            roster: UserRoster::new(),
            tally: ScanTally::default(),
            iterations: 0,
            stopped: false,
        };
        self.merge_snapshot(surface, &mut run).await?;

        let mut previous_height: Option<u64> = None;
        let mut unchanged = 0usize;
        for iteration in 0..self.config.max_iterations {
            if self.stop.is_stopped() {
                info!(iteration, "scan stop requested");
                run.stopped = true;
                break;
            }

            surface.advance().await?;
            sleep(self.config.scroll_interval).await;

            self.drain(&mut queue, &mut run);
            self.merge_snapshot(surface, &mut run).await?;
            run.iterations = iteration + 1;
            self.metrics.with(|m| m.record_iteration());

            self.emit(ScanEvent::Progress {
                loaded: run.roster.len(),
                total: None,
                percentage: progress_percentage(
                    iteration,
                    self.config.max_iterations,
                    run.roster.len(),
                ),
            });

            let height = surface.content_height().await?;
            if previous_height == Some(height) {
                unchanged += 1;
                if unchanged >= self.config.max_stable_iterations {
                    debug!(iteration, height, "content height stable; list fully loaded");
                    break;
                }
            } else {
                unchanged = 0;
            }
            previous_height = Some(height);
        }

        // responses that landed during the last interval
        self.drain(&mut queue, &mut run);
        Ok(run)
    }

    fn drain(&self, queue: &mut mpsc::Receiver<Value>, run: &mut ScanRun) {
        while let Ok(payload) = queue.try_recv() {
            let records = extract_users(&payload);
            run.tally.payloads += 1;
            run.tally.api_records += records.len() as u64;
            self.metrics
                .with(|m| m.record_api_payload(records.len() as u64));
            for record in records {
                if run.roster.merge_network(record) == MergeOutcome::Upgraded {
                    run.tally.upgraded += 1;
                    self.metrics.with(|m| m.record_upgrade());
                }
            }
        }
    }

    async fn merge_snapshot(
        &self,
        surface: &mut dyn ScanSurface,
        run: &mut ScanRun,
    ) -> BrowserResult<()> {
        let mut inserted = 0u64;
        for entry in surface.snapshot().await? {
            if run.roster.merge_dom(UserRecord::from_dom(entry)) == MergeOutcome::Inserted {
                inserted += 1;
            }
        }
        if inserted > 0 {
            run.tally.dom_records += inserted;
            self.metrics.with(|m| m.record_dom_records(inserted));
        }
        Ok(())
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(events) = &self.events {
            // a closed receiver only means nobody is listening
            let _ = events.send(event);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ScanState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Returns the scanner to `Idle` if a scan future is dropped mid-flight.
struct ScanGuard<'a> {
    state: &'a Mutex<ScanState>,
    finished: bool,
}

impl ScanGuard<'_> {
    fn finish(&mut self, state: ScanState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
        self.finished = true;
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = ScanState::Idle;
        }
    }
}

/// Synthetic progress: the true total is unknown, so the iteration share of
/// the cap is reported and 100 is left for completion.
pub fn progress_percentage(iteration: usize, max_iterations: usize, loaded: usize) -> u8 {
    if loaded == 0 || max_iterations == 0 {
        return 0;
    }
    let share = (iteration as f64 / max_iterations as f64 * 100.0).round();
    share.min(MAX_PROGRESS as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_capped_below_completion() {
        assert_eq!(progress_percentage(0, 200, 10), 0);
        assert_eq!(progress_percentage(50, 200, 10), 25);
        assert_eq!(progress_percentage(199, 200, 10), 95);
        assert_eq!(progress_percentage(120, 200, 0), 0);
    }

    #[test]
    fn config_from_section_clamps_zero_capacity() {
        let section = ScanSection {
            settle_ms: 10,
            scroll_interval_ms: 20,
            max_iterations: 3,
            max_stable_iterations: 0,
            intercept_pattern: "/Following".into(),
            queue_capacity: 0,
        };
        let config = ScanConfig::from(&section);
        assert_eq!(config.settle, Duration::from_millis(10));
        assert_eq!(config.max_stable_iterations, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ScanState::Stopped).unwrap(),
            "\"stopped\""
        );
        let event = ScanEvent::Progress {
            loaded: 3,
            total: None,
            percentage: 5,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({ "type": "progress", "loaded": 3, "total": null, "percentage": 5 })
        );
    }
}
