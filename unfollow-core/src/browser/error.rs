use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("response interception failed: {0}")]
    Intercept(String),
    #[error("a scan is already running")]
    ScanInProgress,
    #[error("could not determine the signed-in account; make sure you are logged in")]
    MissingIdentity,
    #[error("{strategy} unfollow unavailable: {reason}")]
    StrategyFailed {
        strategy: &'static str,
        reason: String,
    },
    #[error("could not unfollow @{screen_name}: {reason}")]
    UnfollowExhausted { screen_name: String, reason: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    pub(crate) fn strategy(strategy: &'static str, reason: impl Into<String>) -> Self {
        BrowserError::StrategyFailed {
            strategy,
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Unexpected(err.to_string())
    }
}
