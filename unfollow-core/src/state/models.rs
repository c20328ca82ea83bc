use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::users::UserRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub user_id: String,
    pub screen_name: String,
    pub name: String,
    pub avatar: String,
    pub strategy: Option<String>,
    pub unfollowed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn for_user(user: &UserRecord, strategy: Option<&str>, at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id: user.id.clone(),
            screen_name: user.screen_name.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
            strategy: strategy.map(str::to_string),
            unfollowed_at: at,
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            screen_name: row.get("screen_name")?,
            name: row.get("name")?,
            avatar: row.get("avatar")?,
            strategy: row.get("strategy")?,
            unfollowed_at: row.get("unfollowed_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub user_id: String,
    pub screen_name: String,
    pub added_at: DateTime<Utc>,
}

impl WhitelistEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            screen_name: row.get("screen_name")?,
            added_at: row.get("added_at")?,
        })
    }
}

/// Result of the last completed scan, kept so listing and batch unfollow
/// can run without rescanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedScan {
    pub scan_id: String,
    pub users: Vec<UserRecord>,
    pub scanned_at: DateTime<Utc>,
}
