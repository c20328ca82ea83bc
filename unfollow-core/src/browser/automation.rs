use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::{seq::SliceRandom, Rng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, ViewportSection};

use super::error::{BrowserError, BrowserResult};
use super::metrics::{AutomationMetrics, SharedMetrics};

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
    pub user_data_dir: Option<PathBuf>,
}

/// Starts Chromium against the persistent profile that holds the signed-in
/// session.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<BrowserConfig>,
}

impl BrowserLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        self.launch_with_overrides(LaunchOverrides::default()).await
    }

    pub async fn launch_with_overrides(
        &self,
        overrides: LaunchOverrides,
    ) -> BrowserResult<BrowserAutomation> {
        let user_data_dir = overrides
            .user_data_dir
            .unwrap_or_else(|| PathBuf::from(&self.config.chromium.user_data_dir));
        tokio::fs::create_dir_all(&user_data_dir).await?;

        let viewport = self.select_viewport();
        let user_agent = self.select_user_agent();
        let headless = overrides.headless.unwrap_or(self.config.chromium.headless);
        let chromium_config =
            self.build_chromium_config(&user_data_dir, &viewport, &user_agent, headless)?;
        info!(
            profile = %user_data_dir.display(),
            ua = %user_agent,
            width = viewport.width,
            height = viewport.height,
            headless,
            "launching chromium"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(BrowserAutomation {
            browser,
            handler_task: Some(handler_task),
            config: Arc::clone(&self.config),
            metrics: SharedMetrics::new(),
            viewport,
            user_agent,
        })
    }

    fn select_viewport(&self) -> ViewportSpec {
        let ViewportSection {
            resolutions,
            jitter_pixels,
            device_scale_factor,
        } = &self.config.viewport;

        let mut rng = rand::thread_rng();
        let base = resolutions.choose(&mut rng).cloned().unwrap_or([1366, 768]);
        let jitter = *jitter_pixels as i32;
        let width = (base[0] as i32 + rng.gen_range(-jitter..=jitter)).clamp(640, 2560) as u32;
        let height = (base[1] as i32 + rng.gen_range(-jitter..=jitter)).clamp(480, 1600) as u32;
        let low = device_scale_factor[0].min(device_scale_factor[1]);
        let high = device_scale_factor[0].max(device_scale_factor[1]);
        let scale = rng.gen_range(low..=high) as f64;
        ViewportSpec {
            width,
            height,
            device_scale_factor: scale,
        }
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.config
            .user_agents
            .pool
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| FALLBACK_USER_AGENT.to_string())
    }

    fn build_chromium_config(
        &self,
        user_data_dir: &Path,
        viewport: &ViewportSpec,
        user_agent: &str,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.config.chromium.executable_path)
            .user_data_dir(user_data_dir)
            .viewport(ChromiumViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(viewport.device_scale_factor),
                emulating_mobile: false,
                is_landscape: viewport.width >= viewport.height,
                has_touch: false,
            });

        if !headless {
            builder = builder.with_head();
        }
        if !self.config.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.chromium.tab_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={user_agent}"),
            format!("--window-size={},{}", viewport.width, viewport.height),
        ];
        if self.config.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.config.flags.lang {
            args.push(format!("--lang={lang}"));
        }
        for feature in &self.config.flags.disable_blink_features {
            args.push(format!("--disable-blink-features={feature}"));
        }
        if self.config.flags.no_first_run {
            args.push("--no-first-run".into());
        }
        if self.config.flags.disable_automation_controlled {
            args.push("--disable-features=AutomationControlled".into());
        }
        if let Some(accept) = &self.config.flags.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        // scroll pacing relies on timers firing in a background window
        args.push("--disable-background-timer-throttling".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
    config: Arc<BrowserConfig>,
    metrics: SharedMetrics,
    viewport: ViewportSpec,
    user_agent: String,
}

impl BrowserAutomation {
    pub fn metrics(&self) -> AutomationMetrics {
        self.metrics.snapshot()
    }

    pub fn metrics_handle(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    pub fn viewport(&self) -> &ViewportSpec {
        &self.viewport
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub async fn new_context(&self) -> BrowserResult<BrowserContext> {
        self.metrics.with(|metrics| metrics.record_page_open());
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(BrowserContext {
            page,
            navigation_timeout: Duration::from_secs(
                self.config.chromium.navigation_timeout_seconds.max(1),
            ),
        })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!("shutting down chromium");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        page.enable_stealth_mode_with_agent(&self.user_agent).await?;

        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(self.user_agent.clone());
        if let Some(accept) = &self.config.flags.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;

        if let Some(lang) = &self.config.flags.lang {
            let languages_script = format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{lang}', 'en-US'] }});"
            );
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(languages_script)
                    .build()
                    .map_err(BrowserError::Configuration)?,
            )
            .await?;
        }
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!("BrowserAutomation dropped without explicit shutdown");
            }
        }
    }
}

/// One tab. Navigation is best effort: a page that never reports loaded
/// within the timeout is used as is.
#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
    navigation_timeout: Duration,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        navigate(&self.page, url, self.navigation_timeout).await
    }
}

pub(crate) async fn navigate(page: &Page, url: &str, timeout: Duration) -> BrowserResult<()> {
    let params = NavigateParams::builder()
        .url(url)
        .build()
        .map_err(BrowserError::Configuration)?;
    let loaded = match tokio::time::timeout(timeout, page.goto(params)).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(CdpError::Timeout),
    };
    if !tolerate_timeout(loaded, url, timeout)? {
        return Ok(());
    }
    let settled = match tokio::time::timeout(timeout, page.wait_for_navigation()).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(CdpError::Timeout),
    };
    tolerate_timeout(settled, url, timeout)?;
    Ok(())
}

/// Navigation is best-effort: a page that never finishes loading is used in
/// whatever state it reached. Returns `false` when the wait timed out.
fn tolerate_timeout(
    result: Result<(), CdpError>,
    url: &str,
    timeout: Duration,
) -> BrowserResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(CdpError::Timeout) => {
            warn!(url, timeout_ms = timeout.as_millis() as u64, "page not ready; continuing");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}
