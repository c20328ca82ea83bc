use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipStatus {
    Mutual,
    NotFollowingBack,
}

impl RelationshipStatus {
    pub fn from_followed_by(followed_by: bool) -> Self {
        if followed_by {
            RelationshipStatus::Mutual
        } else {
            RelationshipStatus::NotFollowingBack
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Mutual => "mutual",
            RelationshipStatus::NotFollowingBack => "not-following-back",
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mutual" => Ok(RelationshipStatus::Mutual),
            "not-following-back" => Ok(RelationshipStatus::NotFollowingBack),
            other => Err(format!("unknown relationship status: {other}")),
        }
    }
}

/// A followed account. Records built from rendered list entries carry
/// `incomplete = true`, use the handle as their id and have no counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub screen_name: String,
    pub name: String,
    pub avatar: String,
    pub followers_count: Option<u64>,
    pub following_count: Option<u64>,
    pub statuses_count: Option<u64>,
    pub is_following_you: bool,
    pub is_blue_verified: bool,
    pub description: String,
    pub status: RelationshipStatus,
    pub incomplete: bool,
}

impl UserRecord {
    pub fn from_dom(entry: DomEntry) -> Self {
        let name = entry
            .name
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| entry.screen_name.clone());
        Self {
            id: entry.screen_name.clone(),
            name,
            avatar: entry
                .avatar
                .as_deref()
                .map(upsize_avatar)
                .unwrap_or_default(),
            followers_count: None,
            following_count: None,
            statuses_count: None,
            is_following_you: entry.is_following_you,
            is_blue_verified: entry.is_blue_verified,
            description: String::new(),
            status: RelationshipStatus::from_followed_by(entry.is_following_you),
            incomplete: true,
            screen_name: entry.screen_name,
        }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id.clone(),
            screen_name: self.screen_name.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.screen_name
        } else {
            &self.name
        }
    }
}

/// The `(id, screen_name)` pair an action is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub screen_name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, screen_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            screen_name: screen_name.into(),
        }
    }

    /// Handle-only identity, as produced from a DOM entry or typed by a user.
    pub fn from_screen_name(screen_name: impl Into<String>) -> Self {
        let screen_name = screen_name.into();
        Self {
            id: screen_name.clone(),
            screen_name,
        }
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.screen_name)
    }
}

/// One rendered list entry as read by the snapshot script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomEntry {
    pub screen_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_following_you: bool,
    #[serde(default)]
    pub is_blue_verified: bool,
}

pub fn upsize_avatar(url: &str) -> String {
    url.replacen("_normal", "_bigger", 1)
}
