use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::QuotaSection;
use crate::state::StateResult;

use super::clock::{Clock, SystemClock};
use super::store::{QuotaStore, QuotaWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&QuotaSection> for QuotaPolicy {
    fn from(section: &QuotaSection) -> Self {
        Self {
            limit: section.limit,
            window: Duration::from_secs(section.window_minutes * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub count: u32,
    pub limit: u32,
    /// `None` while no window is open.
    pub reset_in: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaIncrement {
    pub count: u32,
    pub limit: u32,
    pub reset_in: Duration,
    pub limit_reached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    pub reached: bool,
    pub reset_in: Option<Duration>,
}

/// Sliding-window counter for unfollow actions.
///
/// The window opens with the first action and lasts `policy.window`; once
/// that much time has passed the count starts over. Calls are not
/// serialized: callers issue exactly one `increment` per completed action.
#[derive(Debug, Clone)]
pub struct QuotaTracker<S, C = SystemClock> {
    store: S,
    clock: C,
    policy: QuotaPolicy,
}

impl<S: QuotaStore> QuotaTracker<S, SystemClock> {
    pub fn new(store: S, policy: QuotaPolicy) -> Self {
        Self::with_clock(store, policy, SystemClock)
    }
}

impl<S: QuotaStore, C: Clock> QuotaTracker<S, C> {
    pub fn with_clock(store: S, policy: QuotaPolicy, clock: C) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    pub fn limit(&self) -> u32 {
        self.policy.limit
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current count. An expired window is cleared from the store here.
    pub fn peek(&self) -> StateResult<QuotaStatus> {
        let now = self.clock.now();
        let window = match self.store.load_window()? {
            Some(window) if self.expired(&window, now) => {
                self.store.clear_window()?;
                info!(
                    previous_count = window.count,
                    "quota window expired; counter reset"
                );
                None
            }
            other => other,
        };
        Ok(QuotaStatus {
            count: window.map(|w| w.count).unwrap_or(0),
            limit: self.policy.limit,
            reset_in: window.map(|w| self.reset_in(&w, now)),
        })
    }

    pub fn increment(&self) -> StateResult<QuotaIncrement> {
        let now = self.clock.now();
        let next = match self.store.load_window()? {
            Some(window) if !self.expired(&window, now) => QuotaWindow {
                window_start: window.window_start,
                count: window.count.saturating_add(1),
            },
            _ => QuotaWindow {
                window_start: now,
                count: 1,
            },
        };
        self.store.save_window(&next)?;
        let limit_reached = next.count >= self.policy.limit;
        debug!(
            count = next.count,
            limit = self.policy.limit,
            limit_reached,
            "quota incremented"
        );
        Ok(QuotaIncrement {
            count: next.count,
            limit: self.policy.limit,
            reset_in: self.reset_in(&next, now),
            limit_reached,
        })
    }

    pub fn is_limit_reached(&self) -> StateResult<QuotaCheck> {
        let now = self.clock.now();
        match self.store.load_window()? {
            Some(window) if !self.expired(&window, now) => Ok(QuotaCheck {
                reached: window.count >= self.policy.limit,
                reset_in: Some(self.reset_in(&window, now)),
            }),
            _ => Ok(QuotaCheck {
                reached: false,
                reset_in: None,
            }),
        }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.policy.window.as_millis()).unwrap_or(i64::MAX)
    }

    fn expired(&self, window: &QuotaWindow, now: DateTime<Utc>) -> bool {
        (now - window.window_start).num_milliseconds() >= self.window_ms()
    }

    fn reset_in(&self, window: &QuotaWindow, now: DateTime<Utc>) -> Duration {
        let window_ms = self.window_ms();
        let elapsed = (now - window.window_start).num_milliseconds();
        let remaining = (window_ms - elapsed.max(0)).clamp(0, window_ms);
        Duration::from_millis(remaining as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use super::*;
    use crate::quota::MemoryQuotaStore;

    #[derive(Clone)]
    struct ManualClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        fn starting_at(now: DateTime<Utc>) -> Self {
            Self {
                now: Arc::new(Mutex::new(now)),
            }
        }

        fn advance(&self, by: chrono::Duration) {
            let mut guard = self.now.lock().unwrap();
            *guard = *guard + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn tracker() -> (QuotaTracker<Arc<MemoryQuotaStore>, ManualClock>, ManualClock) {
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let tracker = QuotaTracker::with_clock(
            Arc::new(MemoryQuotaStore::new()),
            QuotaPolicy::default(),
            clock.clone(),
        );
        (tracker, clock)
    }

    #[test]
    fn hundredth_increment_reaches_limit() {
        let (tracker, clock) = tracker();
        for _ in 0..98 {
            tracker.increment().unwrap();
            clock.advance(chrono::Duration::seconds(10));
        }
        let ninety_ninth = tracker.increment().unwrap();
        assert_eq!(ninety_ninth.count, 99);
        assert!(!ninety_ninth.limit_reached);

        let hundredth = tracker.increment().unwrap();
        assert_eq!(hundredth.count, 100);
        assert!(hundredth.limit_reached);
        assert!(tracker.is_limit_reached().unwrap().reached);
    }

    #[test]
    fn window_expiry_restarts_count() {
        let (tracker, clock) = tracker();
        for _ in 0..100 {
            tracker.increment().unwrap();
        }
        clock.advance(chrono::Duration::hours(1));
        let next = tracker.increment().unwrap();
        assert_eq!(next.count, 1);
        assert!(!next.limit_reached);
        assert_eq!(next.reset_in, Duration::from_secs(3600));
    }

    #[test]
    fn window_is_anchored_to_first_action_not_calendar_hour() {
        let (tracker, clock) = tracker();
        clock.advance(chrono::Duration::minutes(45));
        tracker.increment().unwrap();
        // crossing the top of the hour does not reset
        clock.advance(chrono::Duration::minutes(30));
        let status = tracker.peek().unwrap();
        assert_eq!(status.count, 1);
        assert_eq!(status.reset_in, Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn peek_clears_expired_window() {
        let (tracker, clock) = tracker();
        tracker.increment().unwrap();
        tracker.increment().unwrap();
        assert_eq!(tracker.peek().unwrap().count, 2);

        clock.advance(chrono::Duration::minutes(61));
        let check = tracker.is_limit_reached().unwrap();
        assert!(!check.reached);
        assert_eq!(check.reset_in, None);

        let status = tracker.peek().unwrap();
        assert_eq!(status.count, 0);
        assert_eq!(status.reset_in, None);
        assert!(tracker.store.load_window().unwrap().is_none());
    }

    #[test]
    fn reset_in_is_clamped_when_clock_moves_backwards() {
        let (tracker, clock) = tracker();
        tracker.increment().unwrap();
        clock.advance(chrono::Duration::minutes(-5));
        let status = tracker.peek().unwrap();
        assert_eq!(status.reset_in, Some(Duration::from_secs(3600)));
    }
}
