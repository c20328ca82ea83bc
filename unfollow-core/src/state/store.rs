use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::quota::{QuotaStore, QuotaWindow};
use crate::sqlite::configure_connection;
use crate::users::{IdentitySet, UserRecord};

use super::models::{CachedScan, HistoryEntry, WhitelistEntry};
use super::{StateError, StateResult};

const STATE_SCHEMA: &str = include_str!("../../../sql/state.sql");
const QUOTA_KEY: &str = "unfollow";
const SCAN_CACHE_KEY: &str = "following";
const DEFAULT_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct SqliteStateStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
    history_limit: usize,
}

impl Default for SqliteStateStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SqliteStateStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn history_limit(mut self, value: usize) -> Self {
        self.history_limit = value.max(1);
        self
    }

    pub fn build(self) -> StateResult<SqliteStateStore> {
        let path = self.path.ok_or(StateError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };

        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        Ok(SqliteStateStore {
            path,
            flags,
            history_limit: self.history_limit,
        })
    }
}

/// Process-wide persisted state: quota window, unfollow history, whitelist
/// and the last scan result.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    path: PathBuf,
    flags: OpenFlags,
    history_limit: usize,
}

impl SqliteStateStore {
    pub fn builder() -> SqliteStateStoreBuilder {
        SqliteStateStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> StateResult<Self> {
        SqliteStateStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> StateResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            StateError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| StateError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> StateResult<()> {
        let conn = self.open()?;
        conn.execute_batch(STATE_SCHEMA)?;
        Ok(())
    }

    /// Appends to the history and trims it to the newest `history_limit` rows.
    pub fn record_unfollow(&self, entry: &HistoryEntry) -> StateResult<i64> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO unfollow_history (
                user_id, screen_name, name, avatar, strategy, unfollowed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &entry.user_id,
                &entry.screen_name,
                &entry.name,
                &entry.avatar,
                &entry.strategy,
                &entry.unfollowed_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let trimmed = tx.execute(
            "DELETE FROM unfollow_history WHERE id NOT IN (
                SELECT id FROM unfollow_history ORDER BY id DESC LIMIT ?1
            )",
            params![self.history_limit as i64],
        )?;
        tx.commit()?;
        if trimmed > 0 {
            debug!(trimmed, "trimmed unfollow history");
        }
        Ok(id)
    }

    /// Newest first.
    pub fn history(&self, limit: usize) -> StateResult<Vec<HistoryEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, screen_name, name, avatar, strategy, unfollowed_at
             FROM unfollow_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], HistoryEntry::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Every account in the history, matched by id or screen name.
    pub fn unfollowed(&self) -> StateResult<IdentitySet> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT DISTINCT user_id, screen_name FROM unfollow_history")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut accounts = IdentitySet::new();
        for row in rows {
            let (user_id, screen_name) = row?;
            accounts.insert(&user_id, &screen_name);
        }
        Ok(accounts)
    }

    /// Returns `false` when the user was already whitelisted.
    pub fn whitelist_add(&self, user_id: &str, screen_name: &str) -> StateResult<bool> {
        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO whitelist (user_id, screen_name, added_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, screen_name, Utc::now()],
        )?;
        Ok(inserted > 0)
    }

    pub fn whitelist_remove(&self, user_id: &str) -> StateResult<bool> {
        let conn = self.open()?;
        let removed = conn.execute("DELETE FROM whitelist WHERE user_id = ?1", params![user_id])?;
        Ok(removed > 0)
    }

    pub fn whitelist(&self) -> StateResult<Vec<WhitelistEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, screen_name, added_at FROM whitelist ORDER BY added_at, user_id",
        )?;
        let rows = stmt.query_map([], WhitelistEntry::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Whitelisted accounts, matched by id or screen name so an entry added
    /// by handle still applies once a scan resolves the numeric id.
    pub fn whitelisted(&self) -> StateResult<IdentitySet> {
        Ok(self
            .whitelist()?
            .iter()
            .map(|entry| (entry.user_id.as_str(), entry.screen_name.as_str()))
            .collect())
    }

    pub fn cache_scan(&self, scan_id: &str, users: &[UserRecord]) -> StateResult<()> {
        let conn = self.open()?;
        let users_json = serde_json::to_string(users)?;
        conn.execute(
            "INSERT INTO scan_cache (cache_key, scan_id, users_json, scanned_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(cache_key) DO UPDATE SET
                scan_id = excluded.scan_id,
                users_json = excluded.users_json,
                scanned_at = excluded.scanned_at",
            params![SCAN_CACHE_KEY, scan_id, users_json, Utc::now()],
        )?;
        Ok(())
    }

    pub fn cached_scan(&self) -> StateResult<Option<CachedScan>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT scan_id, users_json, scanned_at FROM scan_cache WHERE cache_key = ?1",
                params![SCAN_CACHE_KEY],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((scan_id, users_json, scanned_at)) => Ok(Some(CachedScan {
                scan_id,
                users: serde_json::from_str(&users_json)?,
                scanned_at,
            })),
            None => Ok(None),
        }
    }
}

impl QuotaStore for SqliteStateStore {
    fn load_window(&self) -> StateResult<Option<QuotaWindow>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT window_start, count FROM quota_windows WHERE quota_key = ?1",
                params![QUOTA_KEY],
                |row| Ok((row.get::<_, DateTime<Utc>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        match row {
            Some((window_start, count)) => {
                let count = u32::try_from(count)
                    .map_err(|_| StateError::InvalidQuota(format!("negative count {count}")))?;
                Ok(Some(QuotaWindow {
                    window_start,
                    count,
                }))
            }
            None => Ok(None),
        }
    }

    fn save_window(&self, window: &QuotaWindow) -> StateResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO quota_windows (quota_key, window_start, count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(quota_key) DO UPDATE SET
                window_start = excluded.window_start,
                count = excluded.count",
            params![QUOTA_KEY, &window.window_start, window.count as i64],
        )?;
        Ok(())
    }

    fn clear_window(&self) -> StateResult<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM quota_windows WHERE quota_key = ?1",
            params![QUOTA_KEY],
        )?;
        Ok(())
    }
}
