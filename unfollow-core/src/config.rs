use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnfollowConfig {
    pub quota: QuotaSection,
    pub pacing: PacingSection,
    pub scan: ScanSection,
    pub dispatch: DispatchSection,
    pub storage: StorageSection,
}

impl UnfollowConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.storage.data_dir).join(path)
        }
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.resolve_path(&self.storage.state_db)
    }

    pub fn validate(&self) -> Result<()> {
        if self.quota.limit == 0 {
            return Err(ConfigError::Invalid {
                field: "quota.limit",
                reason: "must be greater than zero".into(),
            });
        }
        if self.quota.window_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "quota.window_minutes",
                reason: "must be greater than zero".into(),
            });
        }
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "pacing.min_delay_ms",
                reason: format!(
                    "{} exceeds pacing.max_delay_ms ({})",
                    self.pacing.min_delay_ms, self.pacing.max_delay_ms
                ),
            });
        }
        if self.pacing.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "pacing.batch_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.scan.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "scan.max_iterations",
                reason: "must be greater than zero".into(),
            });
        }
        if self.scan.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "scan.queue_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaSection {
    pub limit: u32,
    pub window_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingSection {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub batch_size: u64,
    pub batch_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    pub settle_ms: u64,
    pub scroll_interval_ms: u64,
    pub max_iterations: usize,
    pub max_stable_iterations: usize,
    pub intercept_pattern: String,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSection {
    pub api_endpoint: String,
    pub bearer_token: String,
    pub csrf_cookie: String,
    pub base_url: String,
    pub click_settle_ms: u64,
    pub confirm_settle_ms: u64,
    pub profile_settle_ms: u64,
    pub profile_attempts: usize,
    pub profile_retry_ms: u64,
    pub profile_click_settle_ms: u64,
    pub profile_confirm_settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub data_dir: String,
    pub state_db: String,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
    pub user_agents: UserAgentSection,
    pub viewport: ViewportSection,
    pub selectors: SelectorSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub user_data_dir: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub navigation_timeout_seconds: u64,
    pub tab_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub disable_automation_controlled: bool,
    pub disable_blink_features: Vec<String>,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportSection {
    pub resolutions: Vec<[u32; 2]>,
    pub jitter_pixels: u32,
    pub device_scale_factor: [f32; 2],
}

/// CSS selectors used by the page surface. Entries in the `*_buttons` lists
/// are tried in order; `{screen_name}` is substituted with the target handle.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub user_cell: String,
    pub cell_link: String,
    pub cell_name: String,
    pub avatar_image: String,
    pub follows_you_indicator: String,
    pub verified_badges: Vec<String>,
    pub profile_link: String,
    pub entry_unfollow_buttons: Vec<String>,
    pub confirm_buttons: Vec<String>,
    pub profile_toggle_buttons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub unfollow: UnfollowConfig,
    pub browser: BrowserConfig,
}

impl ConfigBundle {
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let unfollow = load_unfollow_config(dir.join("unfollow.toml"))?;
        let browser = load_browser_config(dir.join("browser.toml"))?;
        Ok(Self { unfollow, browser })
    }
}

pub fn load_unfollow_config<P: AsRef<Path>>(path: P) -> Result<UnfollowConfig> {
    let config: UnfollowConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

pub fn load_browser_config<P: AsRef<Path>>(path: P) -> Result<BrowserConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
