pub mod browser;
pub mod config;
pub mod error;
pub mod quota;
pub mod session;
pub mod sqlite;
pub mod state;
pub mod users;

pub use browser::{
    extract_users, ActionDispatcher, ActionSurface, AutomationMetrics, BrowserAutomation,
    BrowserError, BrowserLauncher, BrowserResult, CdpInterceptor, DispatchConfig, PacingConfig,
    PacingController, PageSurface, ReconcilingScanner, ResponseInterceptor, ScanConfig, ScanEvent,
    ScanOutcome, ScanState, ScanSurface, SharedMetrics, StopHandle, UnfollowOutcome,
    UnfollowStrategy,
};
pub use config::{
    load_browser_config, load_unfollow_config, BrowserConfig, ConfigBundle, UnfollowConfig,
};
pub use error::{ConfigError, Result};
pub use quota::{
    Clock, MemoryQuotaStore, QuotaPolicy, QuotaStatus, QuotaStore, QuotaTracker, SystemClock,
};
pub use session::{BatchReport, UnfollowReport, UnfollowSession};
pub use state::{
    CachedScan, HistoryEntry, SqliteStateStore, SqliteStateStoreBuilder, StateError, StateResult,
    WhitelistEntry,
};
pub use users::{
    FilterCategory, MergeOutcome, RelationshipStatus, RosterStats, UserFilter, UserIdentity,
    UserRecord, UserRoster,
};
