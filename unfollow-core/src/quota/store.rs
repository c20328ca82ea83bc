use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::StateResult;

/// Counter for one rolling window, anchored at the first action in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindow {
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

/// Keyed persistence for the quota window. Implementations must offer
/// read-your-writes consistency within a process.
pub trait QuotaStore: Send + Sync {
    fn load_window(&self) -> StateResult<Option<QuotaWindow>>;
    fn save_window(&self, window: &QuotaWindow) -> StateResult<()>;
    fn clear_window(&self) -> StateResult<()>;
}

impl<T: QuotaStore + ?Sized> QuotaStore for Arc<T> {
    fn load_window(&self) -> StateResult<Option<QuotaWindow>> {
        (**self).load_window()
    }

    fn save_window(&self, window: &QuotaWindow) -> StateResult<()> {
        (**self).save_window(window)
    }

    fn clear_window(&self) -> StateResult<()> {
        (**self).clear_window()
    }
}

/// Non-persistent store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    window: Mutex<Option<QuotaWindow>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<QuotaWindow>> {
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn load_window(&self) -> StateResult<Option<QuotaWindow>> {
        Ok(*self.slot())
    }

    fn save_window(&self, window: &QuotaWindow) -> StateResult<()> {
        *self.slot() = Some(*window);
        Ok(())
    }

    fn clear_window(&self) -> StateResult<()> {
        *self.slot() = None;
        Ok(())
    }
}
