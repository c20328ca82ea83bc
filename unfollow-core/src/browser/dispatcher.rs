use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{DispatchSection, SelectorSection};
use crate::users::UserIdentity;

use super::error::{BrowserError, BrowserResult};
use super::metrics::SharedMetrics;

const SCREEN_NAME_PLACEHOLDER: &str = "{screen_name}";

static HANDLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

/// What the unfollow strategies need from the signed-in page.
#[async_trait(?Send)]
pub trait ActionSurface {
    async fn cookie(&self, name: &str) -> BrowserResult<Option<String>>;
    /// Sends a form POST with the page's credentials and returns the HTTP
    /// status.
    async fn post_form(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> BrowserResult<u16>;
    async fn current_url(&self) -> BrowserResult<String>;
    async fn navigate(&self, url: &str) -> BrowserResult<()>;
    /// Clicks the first matching control inside the rendered list entry
    /// linking to `screen_name`. `false` when no such entry or control is
    /// visible.
    async fn click_in_entry(&self, screen_name: &str, selectors: &[String])
        -> BrowserResult<bool>;
    async fn click_first(&self, selectors: &[String]) -> BrowserResult<bool>;
}

#[async_trait(?Send)]
pub trait UnfollowStrategy {
    fn name(&self) -> &'static str;
    async fn attempt(&self, surface: &dyn ActionSurface, target: &UserIdentity)
        -> BrowserResult<()>;
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub api_endpoint: String,
    pub bearer_token: String,
    pub csrf_cookie: String,
    pub base_url: String,
    pub click_settle: Duration,
    pub confirm_settle: Duration,
    pub profile_settle: Duration,
    pub profile_attempts: usize,
    pub profile_retry: Duration,
    pub profile_click_settle: Duration,
    pub profile_confirm_settle: Duration,
    pub entry_unfollow_buttons: Vec<String>,
    pub confirm_buttons: Vec<String>,
    pub profile_toggle_buttons: Vec<String>,
}

impl DispatchConfig {
    pub fn new(section: &DispatchSection, selectors: &SelectorSection) -> Self {
        Self {
            api_endpoint: section.api_endpoint.clone(),
            bearer_token: section.bearer_token.clone(),
            csrf_cookie: section.csrf_cookie.clone(),
            base_url: section.base_url.trim_end_matches('/').to_string(),
            click_settle: Duration::from_millis(section.click_settle_ms),
            confirm_settle: Duration::from_millis(section.confirm_settle_ms),
            profile_settle: Duration::from_millis(section.profile_settle_ms),
            profile_attempts: section.profile_attempts.max(1),
            profile_retry: Duration::from_millis(section.profile_retry_ms),
            profile_click_settle: Duration::from_millis(section.profile_click_settle_ms),
            profile_confirm_settle: Duration::from_millis(section.profile_confirm_settle_ms),
            entry_unfollow_buttons: selectors.entry_unfollow_buttons.clone(),
            confirm_buttons: selectors.confirm_buttons.clone(),
            profile_toggle_buttons: selectors.profile_toggle_buttons.clone(),
        }
    }
}

/// Calls the friendship endpoint from inside the page so the session
/// cookies ride along.
#[derive(Debug, Clone)]
pub struct DirectApiStrategy {
    endpoint: String,
    bearer_token: String,
    csrf_cookie: String,
}

impl DirectApiStrategy {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            endpoint: config.api_endpoint.clone(),
            bearer_token: config.bearer_token.clone(),
            csrf_cookie: config.csrf_cookie.clone(),
        }
    }

    /// `user_id` for numeric ids, `screen_name` otherwise.
    pub fn request_body(target: &UserIdentity) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        if is_numeric_id(&target.id) {
            form.append_pair("user_id", &target.id);
        } else if !target.screen_name.is_empty() {
            form.append_pair("screen_name", &target.screen_name);
        } else {
            form.append_pair("screen_name", &target.id);
        }
        form.finish()
    }
}

#[async_trait(?Send)]
impl UnfollowStrategy for DirectApiStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn attempt(
        &self,
        surface: &dyn ActionSurface,
        target: &UserIdentity,
    ) -> BrowserResult<()> {
        if self.bearer_token.is_empty() {
            return Err(BrowserError::strategy(self.name(), "no bearer token configured"));
        }
        let csrf = surface
            .cookie(&self.csrf_cookie)
            .await?
            .filter(|value| !value.is_empty())
            .ok_or_else(|| BrowserError::strategy(self.name(), "missing csrf token"))?;

        let headers = vec![
            (
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.bearer_token),
            ),
            ("X-Csrf-Token".to_string(), csrf),
            ("X-Twitter-Auth-Type".to_string(), "OAuth2Session".to_string()),
            ("X-Twitter-Active-User".to_string(), "yes".to_string()),
        ];
        let status = surface
            .post_form(&self.endpoint, &headers, &Self::request_body(target))
            .await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(BrowserError::strategy(
                self.name(),
                format!("api responded with status {status}"),
            ))
        }
    }
}

/// Uses the entry's own control in the list currently on screen.
#[derive(Debug, Clone)]
pub struct ListEntryStrategy {
    buttons: Vec<String>,
    confirm_buttons: Vec<String>,
    click_settle: Duration,
    confirm_settle: Duration,
}

impl ListEntryStrategy {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            buttons: config.entry_unfollow_buttons.clone(),
            confirm_buttons: config.confirm_buttons.clone(),
            click_settle: config.click_settle,
            confirm_settle: config.confirm_settle,
        }
    }
}

#[async_trait(?Send)]
impl UnfollowStrategy for ListEntryStrategy {
    fn name(&self) -> &'static str {
        "list-entry"
    }

    async fn attempt(
        &self,
        surface: &dyn ActionSurface,
        target: &UserIdentity,
    ) -> BrowserResult<()> {
        if !surface
            .click_in_entry(&target.screen_name, &self.buttons)
            .await?
        {
            return Err(BrowserError::strategy(
                self.name(),
                "entry not found in the current view",
            ));
        }
        sleep(self.click_settle).await;
        if surface.click_first(&self.confirm_buttons).await? {
            sleep(self.confirm_settle).await;
        } else {
            debug!(user = %target, "no confirmation prompt after entry click");
        }
        Ok(())
    }
}

/// Opens the profile page and uses its relationship toggle. The previous
/// location is restored whatever the outcome.
#[derive(Debug, Clone)]
pub struct ProfilePageStrategy {
    base_url: String,
    toggle_buttons: Vec<String>,
    confirm_buttons: Vec<String>,
    settle: Duration,
    attempts: usize,
    retry: Duration,
    click_settle: Duration,
    confirm_settle: Duration,
}

impl ProfilePageStrategy {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            toggle_buttons: config.profile_toggle_buttons.clone(),
            confirm_buttons: config.confirm_buttons.clone(),
            settle: config.profile_settle,
            attempts: config.profile_attempts.max(1),
            retry: config.profile_retry,
            click_settle: config.profile_click_settle,
            confirm_settle: config.profile_confirm_settle,
        }
    }

    fn toggle_selectors(&self, screen_name: &str) -> Vec<String> {
        self.toggle_buttons
            .iter()
            .map(|selector| selector.replace(SCREEN_NAME_PLACEHOLDER, screen_name))
            .collect()
    }

    async fn toggle(&self, surface: &dyn ActionSurface, target: &UserIdentity) -> BrowserResult<()> {
        let profile_url = format!("{}/{}", self.base_url, target.screen_name);
        surface.navigate(&profile_url).await?;
        sleep(self.settle).await;

        let toggles = self.toggle_selectors(&target.screen_name);
        for attempt in 1..=self.attempts {
            if surface.click_first(&toggles).await? {
                sleep(self.click_settle).await;
                if surface.click_first(&self.confirm_buttons).await? {
                    sleep(self.confirm_settle).await;
                    return Ok(());
                }
            }
            debug!(user = %target, attempt, "profile toggle not ready");
            sleep(self.retry).await;
        }
        Err(BrowserError::strategy(
            self.name(),
            format!("toggle not found after {} attempts", self.attempts),
        ))
    }
}

#[async_trait(?Send)]
impl UnfollowStrategy for ProfilePageStrategy {
    fn name(&self) -> &'static str {
        "profile-page"
    }

    async fn attempt(
        &self,
        surface: &dyn ActionSurface,
        target: &UserIdentity,
    ) -> BrowserResult<()> {
        if !HANDLE_PATTERN.is_match(&target.screen_name) {
            return Err(BrowserError::strategy(
                self.name(),
                format!("not a valid handle: {:?}", target.screen_name),
            ));
        }
        let previous = match surface.current_url().await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(error = %err, "could not read current location");
                None
            }
        };

        let result = self.toggle(surface, target).await;

        if let Some(previous) = previous {
            if let Err(err) = surface.navigate(&previous).await {
                warn!(error = %err, url = %previous, "failed to navigate back");
            }
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnfollowOutcome {
    pub success: bool,
    pub strategy: Option<&'static str>,
    pub error: Option<String>,
}

/// Tries each strategy in order and stops at the first success.
pub struct ActionDispatcher {
    strategies: Vec<Box<dyn UnfollowStrategy>>,
    metrics: SharedMetrics,
}

impl ActionDispatcher {
    /// API call, then the on-screen entry, then the profile page.
    pub fn new(config: &DispatchConfig, metrics: SharedMetrics) -> Self {
        Self::with_strategies(
            vec![
                Box::new(DirectApiStrategy::new(config)),
                Box::new(ListEntryStrategy::new(config)),
                Box::new(ProfilePageStrategy::new(config)),
            ],
            metrics,
        )
    }

    pub fn with_strategies(
        strategies: Vec<Box<dyn UnfollowStrategy>>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            strategies,
            metrics,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn unfollow(
        &self,
        surface: &dyn ActionSurface,
        target: &UserIdentity,
    ) -> UnfollowOutcome {
        let mut failures = Vec::with_capacity(self.strategies.len());
        for (index, strategy) in self.strategies.iter().enumerate() {
            if index > 0 {
                self.metrics.with(|m| m.record_fallback());
            }
            match strategy.attempt(surface, target).await {
                Ok(()) => {
                    self.metrics.with(|m| m.record_unfollow_attempt(true));
                    info!(user = %target, strategy = strategy.name(), "unfollowed");
                    return UnfollowOutcome {
                        success: true,
                        strategy: Some(strategy.name()),
                        error: None,
                    };
                }
                Err(err) => {
                    debug!(user = %target, strategy = strategy.name(), error = %err, "strategy failed");
                    failures.push(err.to_string());
                }
            }
        }

        self.metrics.with(|m| m.record_unfollow_attempt(false));
        let reason = if failures.is_empty() {
            "no strategies configured".to_string()
        } else {
            failures.join("; ")
        };
        let err = BrowserError::UnfollowExhausted {
            screen_name: target.screen_name.clone(),
            reason,
        };
        warn!(user = %target, error = %err, "all unfollow strategies failed");
        UnfollowOutcome {
            success: false,
            strategy: None,
            error: Some(err.to_string()),
        }
    }
}

fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_body_prefers_numeric_id() {
        let numeric = UserIdentity::new("12345", "alice");
        assert_eq!(DirectApiStrategy::request_body(&numeric), "user_id=12345");

        let handle_only = UserIdentity::from_screen_name("bob_99");
        assert_eq!(
            DirectApiStrategy::request_body(&handle_only),
            "screen_name=bob_99"
        );
    }

    fn profile_config() -> DispatchConfig {
        DispatchConfig {
            api_endpoint: String::new(),
            bearer_token: String::new(),
            csrf_cookie: "ct0".into(),
            base_url: "https://x.com".into(),
            click_settle: Duration::ZERO,
            confirm_settle: Duration::ZERO,
            profile_settle: Duration::ZERO,
            profile_attempts: 0,
            profile_retry: Duration::ZERO,
            profile_click_settle: Duration::ZERO,
            profile_confirm_settle: Duration::ZERO,
            entry_unfollow_buttons: vec![],
            confirm_buttons: vec![],
            profile_toggle_buttons: vec!["[data-testid=\"{screen_name}-unfollow\"]".into()],
        }
    }

    #[test]
    fn profile_selectors_substitute_handle() {
        let strategy = ProfilePageStrategy::new(&profile_config());
        assert_eq!(strategy.attempts, 1);
        assert_eq!(
            strategy.toggle_selectors("carol"),
            vec!["[data-testid=\"carol-unfollow\"]".to_string()]
        );
    }

    #[test]
    fn handle_validation() {
        assert!(HANDLE_PATTERN.is_match("dan_1"));
        assert!(!HANDLE_PATTERN.is_match("dan/../x"));
        assert!(!HANDLE_PATTERN.is_match(""));
        assert!(is_numeric_id("42"));
        assert!(!is_numeric_id("4a"));
    }
}
