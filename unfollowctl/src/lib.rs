use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use unfollow_core::browser::{
    ActionDispatcher, BrowserAutomation, BrowserContext, BrowserLauncher, CdpInterceptor,
    DispatchConfig, LaunchOverrides, PacingConfig, PacingController, PageSurface,
    ReconcilingScanner, ScanConfig, ScanEvent, ScanState, ScanSurface, StopHandle,
};
use unfollow_core::quota::{QuotaPolicy, QuotaTracker};
use unfollow_core::session::{BatchReport, UnfollowSession};
use unfollow_core::state::{CachedScan, HistoryEntry, SqliteStateStore, WhitelistEntry};
use unfollow_core::users::{DomEntry, FilterCategory, RosterStats, UserFilter, UserRecord};
use unfollow_core::ConfigBundle;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] unfollow_core::ConfigError),
    #[error("browser error: {0}")]
    Browser(#[from] unfollow_core::BrowserError),
    #[error("state error: {0}")]
    State(#[from] unfollow_core::StateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Bulk unfollow control interface", long_about = None)]
pub struct Cli {
    /// Directory containing unfollow.toml and browser.toml
    #[arg(long, default_value = "configs")]
    pub config_dir: PathBuf,
    /// Alternative path for the state database
    #[arg(long)]
    pub state_db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the signed-in account's following list and cache the result
    Scan(ScanArgs),
    /// List users from the last cached scan
    List(ListArgs),
    /// Unfollow named users, or every cached user matching a filter
    Unfollow(UnfollowArgs),
    /// Show the hourly unfollow quota
    Quota,
    /// Summary counts for the cached scan
    Stats,
    /// Users protected from batch unfollow
    #[command(subcommand)]
    Whitelist(WhitelistCommands),
    /// Recently unfollowed users
    History(HistoryArgs),
    /// Print shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BrowserArgs {
    /// Run chromium without a window
    #[arg(long, default_value_t = false)]
    pub headless: bool,
    /// Chromium profile directory holding the signed-in session
    #[arg(long)]
    pub profile_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub browser: BrowserArgs,
    /// Override scan.max_iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// all, not-following-back, non-blue-verified or mutual
    #[arg(long, default_value = "all")]
    pub filter: FilterCategory,
    /// Case-insensitive match on name or handle
    #[arg(long)]
    pub query: Option<String>,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct UnfollowArgs {
    /// Handles to unfollow; empty means every cached user matching --filter
    pub handles: Vec<String>,
    #[arg(long, default_value = "not-following-back")]
    pub filter: FilterCategory,
    #[arg(long)]
    pub query: Option<String>,
    /// Maximum number of users to attempt
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print the targets without touching the browser
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    #[command(flatten)]
    pub browser: BrowserArgs,
}

#[derive(Subcommand, Debug)]
pub enum WhitelistCommands {
    /// Protect a user; the id is taken from the cached scan when known
    Add { handle: String },
    /// Remove a user by handle or id
    Remove { handle: String },
    List,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(args.shell, &mut command, "unfollowctl", &mut io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Scan(args) => {
            let runtime = runtime()?;
            let summary = runtime.block_on(context.scan(args))?;
            render(&summary, cli.format)?;
        }
        Commands::List(args) => {
            let listing = context.list(args)?;
            render(&listing, cli.format)?;
        }
        Commands::Unfollow(args) => {
            let targets = context.resolve_targets(args)?;
            if args.dry_run {
                render(&DryRun { targets }, cli.format)?;
            } else {
                let runtime = runtime()?;
                let batch = runtime.block_on(context.unfollow(&targets, &args.browser))?;
                render(&batch, cli.format)?;
            }
        }
        Commands::Quota => {
            let quota = context.quota()?;
            render(&quota, cli.format)?;
        }
        Commands::Stats => {
            let stats = context.stats()?;
            render(&stats, cli.format)?;
        }
        Commands::Whitelist(WhitelistCommands::Add { handle }) => {
            let change = context.whitelist_add(handle)?;
            render(&change, cli.format)?;
        }
        Commands::Whitelist(WhitelistCommands::Remove { handle }) => {
            let change = context.whitelist_remove(handle)?;
            render(&change, cli.format)?;
        }
        Commands::Whitelist(WhitelistCommands::List) => {
            let entries = context.store.whitelist()?;
            render(&entries, cli.format)?;
        }
        Commands::History(args) => {
            let entries = context.store.history(args.limit)?;
            render(&entries, cli.format)?;
        }
        Commands::Completions(_) => {}
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Turns the first Ctrl-C into a cooperative stop request.
fn watch_interrupt(stop: StopHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            stop.stop();
        }
    })
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    bundle: ConfigBundle,
    store: Arc<SqliteStateStore>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let bundle = ConfigBundle::from_directory(&cli.config_dir)?;
        let state_db = cli
            .state_db
            .clone()
            .unwrap_or_else(|| bundle.unfollow.state_db_path());
        let store = SqliteStateStore::builder()
            .path(&state_db)
            .create_if_missing(true)
            .history_limit(bundle.unfollow.storage.history_limit)
            .build()?;
        store.initialize()?;
        Ok(Self {
            bundle,
            store: Arc::new(store),
        })
    }

    fn launcher(&self) -> BrowserLauncher {
        BrowserLauncher::new(self.bundle.browser.clone())
    }

    fn overrides(args: &BrowserArgs) -> LaunchOverrides {
        LaunchOverrides {
            headless: args.headless.then_some(true),
            user_data_dir: args.profile_dir.clone(),
        }
    }

    fn surface(&self, context: &BrowserContext) -> PageSurface {
        PageSurface::new(
            context,
            self.bundle.browser.selectors.clone(),
            &self.bundle.unfollow.dispatch.base_url,
        )
    }

    fn cached(&self) -> Result<CachedScan> {
        self.store.cached_scan()?.ok_or_else(|| {
            AppError::MissingResource("no cached scan; run `unfollowctl scan` first".to_string())
        })
    }

    async fn scan(&self, args: &ScanArgs) -> Result<ScanSummary> {
        let automation = self
            .launcher()
            .launch_with_overrides(Self::overrides(&args.browser))
            .await?;
        let result = self.scan_with(&automation, args).await;
        automation.shutdown().await?;
        result
    }

    async fn scan_with(
        &self,
        automation: &BrowserAutomation,
        args: &ScanArgs,
    ) -> Result<ScanSummary> {
        let context = automation.new_context().await?;
        context.goto(&self.bundle.unfollow.dispatch.base_url).await?;
        let mut surface = self.surface(&context);
        let interceptor = CdpInterceptor::new(context.page().clone(), automation.metrics_handle());

        let mut config = ScanConfig::from(&self.bundle.unfollow.scan);
        if let Some(max) = args.max_iterations {
            config.max_iterations = max.max(1);
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let scanner =
            ReconcilingScanner::new(config, automation.metrics_handle()).with_events(events_tx);
        let watcher = watch_interrupt(scanner.stop_handle());

        let (outcome, ()) = tokio::join!(
            scanner.scan(&mut surface, &interceptor),
            report_progress(events_rx)
        );
        watcher.abort();
        let outcome = outcome?;

        self.store
            .cache_scan(&outcome.scan_id.to_string(), &outcome.users)?;
        let whitelist = self.store.whitelisted()?;
        info!(scan_id = %outcome.scan_id, users = outcome.users.len(), "scan cached");
        Ok(ScanSummary {
            scan_id: outcome.scan_id.to_string(),
            state: outcome.state,
            iterations: outcome.iterations,
            upgraded: outcome.tally.upgraded,
            stats: RosterStats::collect(&outcome.users, &whitelist),
        })
    }

    fn list(&self, args: &ListArgs) -> Result<UserListing> {
        let cached = self.cached()?;
        let mut filter = UserFilter::new(args.filter);
        if let Some(query) = &args.query {
            filter = filter.with_query(query.clone());
        }
        let mut users: Vec<UserRecord> = filter.apply(&cached.users).into_iter().cloned().collect();
        if let Some(limit) = args.limit {
            users.truncate(limit);
        }
        Ok(UserListing {
            scanned_at: cached.scanned_at,
            filter: args.filter,
            users,
        })
    }

    /// Named handles come from the cache when present; unknown handles are
    /// addressed by handle alone.
    fn resolve_targets(&self, args: &UnfollowArgs) -> Result<Vec<UserRecord>> {
        let mut targets = if args.handles.is_empty() {
            let cached = self.cached()?;
            let mut filter = UserFilter::new(args.filter);
            if let Some(query) = &args.query {
                filter = filter.with_query(query.clone());
            }
            filter.apply(&cached.users).into_iter().cloned().collect()
        } else {
            let cached = self.store.cached_scan()?;
            let known = cached.as_ref().map(|c| c.users.as_slice()).unwrap_or(&[]);
            args.handles
                .iter()
                .map(|handle| normalize_handle(handle))
                .filter(|handle| !handle.is_empty())
                .map(|handle| {
                    find_user(known, &handle).cloned().unwrap_or_else(|| {
                        UserRecord::from_dom(DomEntry {
                            screen_name: handle,
                            ..Default::default()
                        })
                    })
                })
                .collect::<Vec<_>>()
        };
        if let Some(limit) = args.limit {
            targets.truncate(limit);
        }
        if targets.is_empty() {
            return Err(AppError::MissingResource(
                "no users match the requested selection".to_string(),
            ));
        }
        Ok(targets)
    }

    async fn unfollow(&self, targets: &[UserRecord], browser: &BrowserArgs) -> Result<BatchReport> {
        let automation = self
            .launcher()
            .launch_with_overrides(Self::overrides(browser))
            .await?;
        let result = self.unfollow_with(&automation, targets).await;
        automation.shutdown().await?;
        result
    }

    async fn unfollow_with(
        &self,
        automation: &BrowserAutomation,
        targets: &[UserRecord],
    ) -> Result<BatchReport> {
        let context = automation.new_context().await?;
        context.goto(&self.bundle.unfollow.dispatch.base_url).await?;
        let mut surface = self.surface(&context);
        // the list-entry strategy needs the following list on screen
        match surface.current_identity().await? {
            Some(identity) => surface.open_following(&identity).await?,
            None => warn!("signed-in account unknown; list-entry unfollow will be skipped"),
        }

        let metrics = automation.metrics_handle();
        let unfollow = &self.bundle.unfollow;
        let quota = QuotaTracker::new(Arc::clone(&self.store), QuotaPolicy::from(&unfollow.quota));
        let dispatcher = ActionDispatcher::new(
            &DispatchConfig::new(&unfollow.dispatch, &self.bundle.browser.selectors),
            metrics.clone(),
        );
        let pacing = PacingController::new(PacingConfig::from(&unfollow.pacing));
        let session = UnfollowSession::new(quota, dispatcher, pacing, metrics)
            .with_ledger(Arc::clone(&self.store));

        let whitelist = self.store.whitelisted()?;
        let watcher = watch_interrupt(session.stop_handle());
        let batch = session.unfollow_batch(&surface, targets, &whitelist).await;
        watcher.abort();
        Ok(batch?)
    }

    fn quota(&self) -> Result<QuotaView> {
        let tracker = QuotaTracker::new(
            Arc::clone(&self.store),
            QuotaPolicy::from(&self.bundle.unfollow.quota),
        );
        let status = tracker.peek()?;
        Ok(QuotaView {
            count: status.count,
            limit: status.limit,
            remaining: status.limit.saturating_sub(status.count),
            reset_in_secs: status.reset_in.map(|d| d.as_secs()),
        })
    }

    fn stats(&self) -> Result<RosterStats> {
        let cached = self.cached()?;
        let whitelist = self.store.whitelisted()?;
        Ok(RosterStats::collect(&cached.users, &whitelist))
    }

    fn whitelist_add(&self, handle: &str) -> Result<WhitelistChange> {
        let handle = normalize_handle(handle);
        let cached = self.store.cached_scan()?;
        let known = cached.as_ref().map(|c| c.users.as_slice()).unwrap_or(&[]);
        let (user_id, screen_name) = match find_user(known, &handle) {
            Some(user) => (user.id.clone(), user.screen_name.clone()),
            None => (handle.clone(), handle.clone()),
        };
        let changed = self.store.whitelist_add(&user_id, &screen_name)?;
        Ok(WhitelistChange {
            user_id,
            screen_name,
            action: "add",
            changed,
        })
    }

    fn whitelist_remove(&self, handle: &str) -> Result<WhitelistChange> {
        let handle = normalize_handle(handle);
        let entry = self
            .store
            .whitelist()?
            .into_iter()
            .find(|entry| entry.user_id == handle || entry.screen_name.eq_ignore_ascii_case(&handle));
        let (user_id, screen_name) = match entry {
            Some(entry) => (entry.user_id, entry.screen_name),
            None => (handle.clone(), handle.clone()),
        };
        let changed = self.store.whitelist_remove(&user_id)?;
        Ok(WhitelistChange {
            user_id,
            screen_name,
            action: "remove",
            changed,
        })
    }
}

async fn report_progress(mut events: mpsc::UnboundedReceiver<ScanEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Progress {
                loaded, percentage, ..
            } => eprintln!("scanning: {loaded} users loaded ({percentage}%)"),
            ScanEvent::Complete { users } => {
                eprintln!("scan finished: {} users", users.len());
                break;
            }
            ScanEvent::Error { error } => {
                eprintln!("scan failed: {error}");
                break;
            }
        }
    }
}

fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_string()
}

fn find_user<'a>(users: &'a [UserRecord], handle: &str) -> Option<&'a UserRecord> {
    users
        .iter()
        .find(|user| user.id == handle || user.screen_name.eq_ignore_ascii_case(handle))
}

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub scan_id: String,
    pub state: ScanState,
    pub iterations: usize,
    pub upgraded: u64,
    pub stats: RosterStats,
}

impl DisplayFallback for ScanSummary {
    fn display(&self) -> String {
        format!(
            "Scan {id} {state} after {iterations} iterations\n{stats}",
            id = self.scan_id,
            state = self.state,
            iterations = self.iterations,
            stats = self.stats.display()
        )
    }
}

#[derive(Debug, Serialize)]
pub struct UserListing {
    pub scanned_at: DateTime<Utc>,
    pub filter: FilterCategory,
    pub users: Vec<UserRecord>,
}

impl DisplayFallback for UserListing {
    fn display(&self) -> String {
        if self.users.is_empty() {
            return format!("No users match filter {}", self.filter);
        }
        let mut lines = vec![format!(
            "{} users ({}) from scan at {}",
            self.users.len(),
            self.filter,
            self.scanned_at.format("%Y-%m-%d %H:%M")
        )];
        for user in &self.users {
            lines.push(user_line(user));
        }
        lines.join("\n")
    }
}

fn user_line(user: &UserRecord) -> String {
    let followers = user
        .followers_count
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut flags = Vec::new();
    if user.is_blue_verified {
        flags.push("verified");
    }
    if user.incomplete {
        flags.push("partial");
    }
    format!(
        "@{handle} | {name} | {status} | followers={followers}{flags}",
        handle = user.screen_name,
        name = user.display_name(),
        status = user.status,
        flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(","))
        }
    )
}

#[derive(Debug, Serialize)]
pub struct DryRun {
    pub targets: Vec<UserRecord>,
}

impl DisplayFallback for DryRun {
    fn display(&self) -> String {
        let mut lines = vec![format!("Would unfollow {} users:", self.targets.len())];
        for user in &self.targets {
            lines.push(format!("  {}", user_line(user)));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for BatchReport {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for report in &self.reports {
            if report.success {
                lines.push(format!(
                    "unfollowed @{} via {} ({}/{})",
                    report.screen_name,
                    report.strategy.unwrap_or("-"),
                    report.hourly_count,
                    report.limit
                ));
            } else {
                lines.push(format!(
                    "failed @{}: {}",
                    report.screen_name,
                    report.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        lines.push(format!(
            "Done: {} unfollowed, {} failed, {} whitelisted skipped, {} already unfollowed",
            self.succeeded(),
            self.failed(),
            self.skipped_whitelisted,
            self.skipped_already_unfollowed
        ));
        if self.stopped_at_limit {
            let reset = self
                .reports
                .last()
                .and_then(|r| r.reset_in_secs)
                .map(|secs| format!(" (resets in {} min)", secs.div_ceil(60)))
                .unwrap_or_default();
            lines.push(format!("Hourly limit reached{reset}"));
        }
        if self.cancelled {
            lines.push("Stopped on request".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaView {
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_secs: Option<u64>,
}

impl DisplayFallback for QuotaView {
    fn display(&self) -> String {
        let reset = match self.reset_in_secs {
            Some(secs) => format!("window resets in {} min", secs.div_ceil(60)),
            None => "no window open".to_string(),
        };
        format!(
            "Unfollows this hour: {}/{} ({} remaining, {reset})",
            self.count, self.limit, self.remaining
        )
    }
}

impl DisplayFallback for RosterStats {
    fn display(&self) -> String {
        format!(
            "Following: {}\nNot following back: {}\nBlue verified: {}\nWhitelisted: {}",
            self.following, self.not_following_back, self.blue_verified, self.whitelisted
        )
    }
}

#[derive(Debug, Serialize)]
pub struct WhitelistChange {
    pub user_id: String,
    pub screen_name: String,
    pub action: &'static str,
    pub changed: bool,
}

impl DisplayFallback for WhitelistChange {
    fn display(&self) -> String {
        match (self.action, self.changed) {
            ("add", true) => format!("@{} whitelisted", self.screen_name),
            ("add", false) => format!("@{} was already whitelisted", self.screen_name),
            (_, true) => format!("@{} removed from whitelist", self.screen_name),
            (_, false) => format!("@{} was not whitelisted", self.screen_name),
        }
    }
}

impl DisplayFallback for Vec<WhitelistEntry> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "Whitelist is empty".to_string();
        }
        self.iter()
            .map(|entry| {
                format!(
                    "@{} (id {}) since {}",
                    entry.screen_name,
                    entry.user_id,
                    entry.added_at.format("%Y-%m-%d")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for Vec<HistoryEntry> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No unfollows recorded".to_string();
        }
        self.iter()
            .map(|entry| {
                format!(
                    "{} @{} via {}",
                    entry.unfollowed_at.format("%Y-%m-%d %H:%M"),
                    entry.screen_name,
                    entry.strategy.as_deref().unwrap_or("-")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use unfollow_core::users::RelationshipStatus;

    fn user(id: &str, handle: &str, follows_you: bool) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            screen_name: handle.to_string(),
            name: handle.to_uppercase(),
            avatar: String::new(),
            followers_count: Some(1),
            following_count: Some(2),
            statuses_count: Some(3),
            is_following_you: follows_you,
            is_blue_verified: false,
            description: String::new(),
            status: RelationshipStatus::from_followed_by(follows_you),
            incomplete: false,
        }
    }

    fn prepare_test_context() -> Result<(TempDir, AppContext)> {
        let temp = TempDir::new().unwrap();
        let configs_dir = temp.path().join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy("../configs/unfollow.toml", configs_dir.join("unfollow.toml")).unwrap();
        fs::copy("../configs/browser.toml", configs_dir.join("browser.toml")).unwrap();

        let cli = Cli {
            config_dir: configs_dir,
            state_db: Some(temp.path().join("data/state.sqlite")),
            format: OutputFormat::Json,
            command: Commands::Quota,
        };
        let context = AppContext::new(&cli)?;
        context
            .store
            .cache_scan(
                "scan-1",
                &[
                    user("1", "ada", true),
                    user("2", "Bob", false),
                    user("3", "cy", false),
                ],
            )
            .unwrap();
        Ok((temp, context))
    }

    fn unfollow_args(handles: &[&str]) -> UnfollowArgs {
        UnfollowArgs {
            handles: handles.iter().map(|h| h.to_string()).collect(),
            filter: FilterCategory::NotFollowingBack,
            query: None,
            limit: None,
            dry_run: true,
            browser: BrowserArgs::default(),
        }
    }

    #[test]
    fn listing_applies_filter_and_limit() {
        let (_temp, context) = prepare_test_context().unwrap();
        let listing = context
            .list(&ListArgs {
                filter: FilterCategory::NotFollowingBack,
                query: None,
                limit: Some(1),
            })
            .unwrap();
        assert_eq!(listing.users.len(), 1);
        assert_eq!(listing.users[0].screen_name, "Bob");
    }

    #[test]
    fn named_targets_resolve_through_cache() {
        let (_temp, context) = prepare_test_context().unwrap();
        let targets = context
            .resolve_targets(&unfollow_args(&["@bob", "stranger"]))
            .unwrap();
        assert_eq!(targets[0].id, "2");
        assert_eq!(targets[1].id, "stranger");
        assert!(targets[1].incomplete);
    }

    #[test]
    fn filtered_targets_default_to_non_followers() {
        let (_temp, context) = prepare_test_context().unwrap();
        let targets = context.resolve_targets(&unfollow_args(&[])).unwrap();
        let handles: Vec<_> = targets.iter().map(|u| u.screen_name.as_str()).collect();
        assert_eq!(handles, vec!["Bob", "cy"]);
    }

    #[test]
    fn whitelist_uses_cached_id_and_feeds_stats() {
        let (_temp, context) = prepare_test_context().unwrap();
        let added = context.whitelist_add("@BOB").unwrap();
        assert_eq!(added.user_id, "2");
        assert!(added.changed);
        assert!(!context.whitelist_add("bob").unwrap().changed);

        let stats = context.stats().unwrap();
        assert_eq!(stats.following, 3);
        assert_eq!(stats.not_following_back, 2);
        assert_eq!(stats.whitelisted, 1);

        let removed = context.whitelist_remove("bob").unwrap();
        assert!(removed.changed);
        assert_eq!(removed.user_id, "2");
    }

    #[test]
    fn quota_starts_empty() {
        let (_temp, context) = prepare_test_context().unwrap();
        let quota = context.quota().unwrap();
        assert_eq!(quota.count, 0);
        assert_eq!(quota.limit, 100);
        assert_eq!(quota.remaining, 100);
        assert!(quota.display().contains("no window open"));
    }

    #[test]
    fn cli_parses_unfollow_flags() {
        let cli = Cli::try_parse_from([
            "unfollowctl",
            "--format",
            "json",
            "unfollow",
            "--filter",
            "non-blue-verified",
            "--limit",
            "5",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Unfollow(args) => {
                assert_eq!(args.filter, FilterCategory::NonBlueVerified);
                assert_eq!(args.limit, Some(5));
                assert!(args.dry_run);
                assert!(args.handles.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
