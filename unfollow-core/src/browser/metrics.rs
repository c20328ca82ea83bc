use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationMetrics {
    pub pages_opened: u64,
    pub scans_started: u64,
    pub scan_iterations: u64,
    pub api_payloads: u64,
    pub api_records: u64,
    pub dom_records: u64,
    pub records_upgraded: u64,
    pub queue_overflows: u64,
    pub unfollow_attempts: u64,
    pub unfollow_success: u64,
    pub strategy_fallbacks: u64,
    pub quota_blocks: u64,
}

impl AutomationMetrics {
    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_scan_start(&mut self) {
        self.scans_started = self.scans_started.saturating_add(1);
    }

    pub fn record_iteration(&mut self) {
        self.scan_iterations = self.scan_iterations.saturating_add(1);
    }

    pub fn record_api_payload(&mut self, records: u64) {
        self.api_payloads = self.api_payloads.saturating_add(1);
        self.api_records = self.api_records.saturating_add(records);
    }

    pub fn record_dom_records(&mut self, count: u64) {
        self.dom_records = self.dom_records.saturating_add(count);
    }

    pub fn record_upgrade(&mut self) {
        self.records_upgraded = self.records_upgraded.saturating_add(1);
    }

    pub fn record_queue_overflow(&mut self) {
        self.queue_overflows = self.queue_overflows.saturating_add(1);
    }

    pub fn record_unfollow_attempt(&mut self, success: bool) {
        self.unfollow_attempts = self.unfollow_attempts.saturating_add(1);
        if success {
            self.unfollow_success = self.unfollow_success.saturating_add(1);
        }
    }

    pub fn record_fallback(&mut self) {
        self.strategy_fallbacks = self.strategy_fallbacks.saturating_add(1);
    }

    pub fn record_quota_block(&mut self) {
        self.quota_blocks = self.quota_blocks.saturating_add(1);
    }

    pub fn unfollow_success_rate(&self) -> f64 {
        if self.unfollow_attempts == 0 {
            0.0
        } else {
            (self.unfollow_success as f64 / self.unfollow_attempts as f64) * 100.0
        }
    }
}

/// Cloneable handle shared by the scanner, dispatcher and page surfaces.
#[derive(Debug, Clone, Default)]
pub struct SharedMetrics {
    inner: Arc<Mutex<AutomationMetrics>>,
}

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AutomationMetrics {
        self.with(|metrics| metrics.clone())
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut AutomationMetrics) -> R,
    {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
