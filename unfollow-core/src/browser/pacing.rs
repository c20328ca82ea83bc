use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::PacingSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub batch_size: u64,
    pub batch_pause: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(3_000),
            batch_size: 50,
            batch_pause: Duration::from_secs(60),
        }
    }
}

impl From<&PacingSection> for PacingConfig {
    fn from(section: &PacingSection) -> Self {
        Self {
            min_delay: Duration::from_millis(section.min_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
            batch_size: section.batch_size.max(1),
            batch_pause: Duration::from_millis(section.batch_pause_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacingState {
    pub action_count: u64,
    pub paused: bool,
}

struct Inner {
    state: PacingState,
    waiters: VecDeque<oneshot::Sender<()>>,
    rng: ChaCha8Rng,
}

/// Spaces out mutating actions: a uniform random delay per action and a
/// longer fixed pause after every `batch_size` actions. While paused, every
/// `wait` parks until `resume` or `reset` releases it.
#[derive(Clone)]
pub struct PacingController {
    config: PacingConfig,
    inner: Arc<Mutex<Inner>>,
}

impl PacingController {
    pub fn new(config: PacingConfig) -> Self {
        Self::with_rng(config, ChaCha8Rng::from_entropy())
    }

    pub fn with_seed(config: PacingConfig, seed: u64) -> Self {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(config: PacingConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: PacingState::default(),
                waiters: VecDeque::new(),
                rng,
            })),
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    pub fn state(&self) -> PacingState {
        self.lock().state
    }

    /// Suspends the caller and returns how long it slept, not counting time
    /// spent parked while paused.
    pub async fn wait(&self) -> Duration {
        let parked = {
            let mut inner = self.lock();
            if inner.state.paused {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = parked {
            debug!("pacing paused; waiting for resume");
            // A dropped sender means the controller went away; carry on.
            let _ = rx.await;
        }

        let (delay, batch_boundary, action_count) = {
            let mut inner = self.lock();
            inner.state.action_count = inner.state.action_count.saturating_add(1);
            let count = inner.state.action_count;
            if count % self.config.batch_size.max(1) == 0 {
                (self.config.batch_pause, true, count)
            } else {
                let lower = self.config.min_delay.min(self.config.max_delay).as_millis() as u64;
                let upper = self.config.min_delay.max(self.config.max_delay).as_millis() as u64;
                let delay = Duration::from_millis(inner.rng.gen_range(lower..=upper));
                (delay, false, count)
            }
        };

        if batch_boundary {
            info!(
                action_count,
                pause_ms = delay.as_millis() as u64,
                "batch threshold reached; taking extended pause"
            );
        }
        sleep(delay).await;
        delay
    }

    pub fn pause(&self) {
        self.lock().state.paused = true;
        info!("pacing paused");
    }

    /// Clears the paused flag and releases one parked `wait`, if any.
    pub fn resume(&self) {
        let mut inner = self.lock();
        inner.state.paused = false;
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                break;
            }
        }
        info!(parked = inner.waiters.len(), "pacing resumed");
    }

    /// Zeroes the action counter and releases every parked `wait`.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = PacingState::default();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for PacingController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacingController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
