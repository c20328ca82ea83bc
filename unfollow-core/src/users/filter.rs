use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::identity::IdentitySet;
use super::record::{RelationshipStatus, UserRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterCategory {
    #[default]
    All,
    NotFollowingBack,
    NonBlueVerified,
    Mutual,
}

impl FilterCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterCategory::All => "all",
            FilterCategory::NotFollowingBack => "not-following-back",
            FilterCategory::NonBlueVerified => "non-blue-verified",
            FilterCategory::Mutual => "mutual",
        }
    }

    fn admits(&self, user: &UserRecord) -> bool {
        match self {
            FilterCategory::All => true,
            FilterCategory::NotFollowingBack => user.status == RelationshipStatus::NotFollowingBack,
            FilterCategory::NonBlueVerified => !user.is_blue_verified,
            FilterCategory::Mutual => user.status == RelationshipStatus::Mutual,
        }
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(FilterCategory::All),
            "not-following-back" | "nfb" => Ok(FilterCategory::NotFollowingBack),
            "non-blue-verified" | "non-blue-v" => Ok(FilterCategory::NonBlueVerified),
            "mutual" => Ok(FilterCategory::Mutual),
            other => Err(format!("unknown filter category: {other}")),
        }
    }
}

/// Category plus free-text search over display name and handle.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub category: FilterCategory,
    pub query: Option<String>,
}

impl UserFilter {
    pub fn new(category: FilterCategory) -> Self {
        Self {
            category,
            query: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into().trim().to_lowercase();
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    pub fn matches(&self, user: &UserRecord) -> bool {
        if !self.category.admits(user) {
            return false;
        }
        match &self.query {
            Some(query) => {
                user.name.to_lowercase().contains(query)
                    || user.screen_name.to_lowercase().contains(query)
            }
            None => true,
        }
    }

    pub fn apply<'a>(&self, users: &'a [UserRecord]) -> Vec<&'a UserRecord> {
        users.iter().filter(|user| self.matches(user)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    pub following: usize,
    pub not_following_back: usize,
    pub blue_verified: usize,
    pub whitelisted: usize,
}

impl RosterStats {
    pub fn collect(users: &[UserRecord], whitelist: &IdentitySet) -> Self {
        let mut stats = RosterStats {
            following: users.len(),
            ..Default::default()
        };
        for user in users {
            if user.status == RelationshipStatus::NotFollowingBack {
                stats.not_following_back += 1;
            }
            if user.is_blue_verified {
                stats.blue_verified += 1;
            }
            if whitelist.contains(user) {
                stats.whitelisted += 1;
            }
        }
        stats
    }
}
