mod automation;
mod dispatcher;
mod error;
mod extractor;
mod interceptor;
mod metrics;
mod pacing;
mod scanner;
mod surface;

pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher, LaunchOverrides, ViewportSpec};
pub use dispatcher::{
    ActionDispatcher, ActionSurface, DirectApiStrategy, DispatchConfig, ListEntryStrategy,
    ProfilePageStrategy, UnfollowOutcome, UnfollowStrategy,
};
pub use error::{BrowserError, BrowserResult};
pub use extractor::extract_users;
pub use interceptor::{matches_pattern, CdpInterceptor, InterceptSubscription, ResponseInterceptor};
pub use metrics::{AutomationMetrics, SharedMetrics};
pub use pacing::{PacingConfig, PacingController, PacingState};
pub use scanner::{
    progress_percentage, ReconcilingScanner, ScanConfig, ScanEvent, ScanOutcome, ScanState,
    ScanSurface, ScanTally, StopHandle,
};
pub use surface::PageSurface;
