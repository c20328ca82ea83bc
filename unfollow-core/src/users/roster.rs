use std::collections::HashMap;

use super::record::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Upgraded,
    Duplicate,
    Rejected,
}

/// Ordered, deduplicated user list.
///
/// Two records describe the same account when they share an `id` or a
/// screen name (compared case-insensitively). A complete record replaces an
/// incomplete one in place; a complete record is never replaced.
#[derive(Debug, Clone, Default)]
pub struct UserRoster {
    users: Vec<UserRecord>,
    by_id: HashMap<String, usize>,
    by_screen_name: HashMap<String, usize>,
}

impl UserRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn into_users(self) -> Vec<UserRecord> {
        self.users
    }

    pub fn get(&self, key: &str) -> Option<&UserRecord> {
        self.by_id
            .get(key)
            .or_else(|| self.by_screen_name.get(&name_key(key)))
            .map(|idx| &self.users[*idx])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn merge(&mut self, record: UserRecord) -> MergeOutcome {
        if record.incomplete {
            self.merge_dom(record)
        } else {
            self.merge_network(record)
        }
    }

    /// Upgrade-or-insert for records extracted from list responses.
    pub fn merge_network(&mut self, record: UserRecord) -> MergeOutcome {
        if record.id.is_empty() || record.screen_name.is_empty() {
            return MergeOutcome::Rejected;
        }
        let matches = self.lookup(&record);
        if matches.is_empty() {
            self.push(record);
            return MergeOutcome::Inserted;
        }
        if matches.iter().any(|idx| !self.users[*idx].incomplete) {
            return MergeOutcome::Duplicate;
        }

        let target = matches[0];
        if matches.len() == 1 {
            self.unindex(target);
            self.users[target] = record;
            self.index(target);
        } else {
            // The incoming keys straddle several partial entries; keep the
            // earliest position and drop the rest.
            self.users[target] = record;
            for idx in matches.iter().skip(1).rev() {
                self.users.remove(*idx);
            }
            self.reindex();
        }
        MergeOutcome::Upgraded
    }

    /// Insert-if-unseen for records parsed from rendered list entries.
    pub fn merge_dom(&mut self, record: UserRecord) -> MergeOutcome {
        if record.screen_name.is_empty() {
            return MergeOutcome::Rejected;
        }
        if self.lookup(&record).is_empty() {
            self.push(record);
            MergeOutcome::Inserted
        } else {
            MergeOutcome::Duplicate
        }
    }

    fn lookup(&self, record: &UserRecord) -> Vec<usize> {
        let mut found = Vec::with_capacity(2);
        if let Some(idx) = self.by_id.get(&record.id) {
            found.push(*idx);
        }
        if let Some(idx) = self.by_screen_name.get(&name_key(&record.screen_name)) {
            if !found.contains(idx) {
                found.push(*idx);
            }
        }
        found.sort_unstable();
        found
    }

    fn push(&mut self, record: UserRecord) {
        self.users.push(record);
        self.index(self.users.len() - 1);
    }

    fn index(&mut self, idx: usize) {
        let record = &self.users[idx];
        self.by_id.insert(record.id.clone(), idx);
        self.by_screen_name
            .insert(name_key(&record.screen_name), idx);
    }

    fn unindex(&mut self, idx: usize) {
        let record = &self.users[idx];
        if self.by_id.get(&record.id) == Some(&idx) {
            self.by_id.remove(&record.id);
        }
        let key = name_key(&record.screen_name);
        if self.by_screen_name.get(&key) == Some(&idx) {
            self.by_screen_name.remove(&key);
        }
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_screen_name.clear();
        for idx in 0..self.users.len() {
            self.index(idx);
        }
    }
}

fn name_key(screen_name: &str) -> String {
    screen_name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::users::{DomEntry, RelationshipStatus};

    fn complete(id: &str, screen_name: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            screen_name: screen_name.into(),
            name: screen_name.to_uppercase(),
            avatar: String::new(),
            followers_count: Some(10),
            following_count: Some(20),
            statuses_count: Some(30),
            is_following_you: false,
            is_blue_verified: false,
            description: String::new(),
            status: RelationshipStatus::NotFollowingBack,
            incomplete: false,
        }
    }

    fn partial(screen_name: &str) -> UserRecord {
        UserRecord::from_dom(DomEntry {
            screen_name: screen_name.into(),
            ..Default::default()
        })
    }

    fn assert_unique(roster: &UserRoster) {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for user in roster.users() {
            assert!(ids.insert(user.id.clone()), "duplicate id {}", user.id);
            assert!(
                names.insert(user.screen_name.to_ascii_lowercase()),
                "duplicate screen name {}",
                user.screen_name
            );
        }
    }

    #[test]
    fn complete_record_upgrades_partial_in_place() {
        let mut roster = UserRoster::new();
        assert_eq!(roster.merge(partial("alice")), MergeOutcome::Inserted);
        assert_eq!(roster.merge(complete("2", "bob")), MergeOutcome::Inserted);
        assert_eq!(
            roster.merge(complete("1", "alice")),
            MergeOutcome::Upgraded
        );

        let users = roster.users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "1");
        assert!(!users[0].incomplete);
        assert_eq!(users[0].followers_count, Some(10));
        assert_eq!(users[1].screen_name, "bob");
        assert!(roster.contains_key("1"));
        assert!(roster.contains_key("ALICE"));
    }

    #[test]
    fn complete_record_is_never_downgraded() {
        let mut roster = UserRoster::new();
        roster.merge(complete("1", "alice"));
        assert_eq!(roster.merge(partial("alice")), MergeOutcome::Duplicate);
        assert_eq!(
            roster.merge(complete("1", "alice-renamed")),
            MergeOutcome::Duplicate
        );
        assert_eq!(roster.len(), 1);
        assert!(!roster.users()[0].incomplete);
    }

    #[test]
    fn dom_records_only_fill_unseen_keys() {
        let mut roster = UserRoster::new();
        roster.merge(complete("7", "dave"));
        assert_eq!(roster.merge(partial("Dave")), MergeOutcome::Duplicate);
        assert_eq!(roster.merge(partial("erin")), MergeOutcome::Inserted);
        assert_eq!(roster.merge(partial("erin")), MergeOutcome::Duplicate);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn records_without_keys_are_rejected() {
        let mut roster = UserRoster::new();
        assert_eq!(roster.merge(complete("", "ghost")), MergeOutcome::Rejected);
        assert_eq!(roster.merge(partial("")), MergeOutcome::Rejected);
        assert!(roster.is_empty());
    }

    #[test]
    fn straddling_upgrade_collapses_partials() {
        let mut roster = UserRoster::new();
        roster.merge(partial("frank"));
        roster.merge(partial("grace"));
        roster.merge(partial("heidi"));
        // id collides with the handle-derived id of "heidi", handle with "frank"
        assert_eq!(
            roster.merge(complete("heidi", "frank")),
            MergeOutcome::Upgraded
        );
        assert_unique(&roster);
        let names: Vec<_> = roster
            .users()
            .iter()
            .map(|user| user.screen_name.as_str())
            .collect();
        assert_eq!(names, vec!["frank", "grace"]);
    }

    #[test]
    fn arbitrary_merge_sequences_keep_keys_unique() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        let handles = ["ann", "Ann", "ben", "cat", "dan", "eve", "1", "2", "3"];
        for _ in 0..200 {
            let mut roster = UserRoster::new();
            for _ in 0..40 {
                let handle = handles[rng.gen_range(0..handles.len())];
                let record = if rng.gen_bool(0.5) {
                    partial(handle)
                } else {
                    let id = handles[rng.gen_range(0..handles.len())];
                    complete(id, handle)
                };
                roster.merge(record);
                assert_unique(&roster);
            }
        }
    }
}
