use std::collections::HashSet;

use super::record::UserRecord;

/// Accounts recorded by id and by screen name.
///
/// A record matches when either its `id` or its screen name (compared
/// case-insensitively) was inserted, so an entry stored under a bare handle
/// still covers the account after a scan resolves its numeric id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySet {
    ids: HashSet<String>,
    screen_names: HashSet<String>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, screen_name: &str) {
        if !id.is_empty() {
            self.ids.insert(id.to_string());
        }
        if !screen_name.is_empty() {
            self.screen_names.insert(screen_name.to_ascii_lowercase());
        }
    }

    pub fn contains(&self, user: &UserRecord) -> bool {
        self.ids.contains(&user.id)
            || (!user.screen_name.is_empty()
                && self
                    .screen_names
                    .contains(&user.screen_name.to_ascii_lowercase()))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.screen_names.is_empty()
    }
}

impl<I: AsRef<str>, N: AsRef<str>> FromIterator<(I, N)> for IdentitySet {
    fn from_iter<T: IntoIterator<Item = (I, N)>>(iter: T) -> Self {
        let mut set = IdentitySet::new();
        for (id, screen_name) in iter {
            set.insert(id.as_ref(), screen_name.as_ref());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::DomEntry;

    fn network(id: &str, handle: &str) -> UserRecord {
        let mut record = UserRecord::from_dom(DomEntry {
            screen_name: handle.to_string(),
            ..Default::default()
        });
        record.id = id.to_string();
        record.incomplete = false;
        record
    }

    #[test]
    fn handle_entry_covers_resolved_account() {
        let set: IdentitySet = [("alice", "alice")].into_iter().collect();
        assert!(set.contains(&network("100", "Alice")));
        assert!(!set.contains(&network("101", "bob")));
    }

    #[test]
    fn id_entry_covers_renamed_account() {
        let set: IdentitySet = [("100", "alice")].into_iter().collect();
        assert!(set.contains(&network("100", "alice_2")));
        let dom = UserRecord::from_dom(DomEntry {
            screen_name: "ALICE".into(),
            ..Default::default()
        });
        assert!(set.contains(&dom));
        assert!(set.contains_id("100"));
    }

    #[test]
    fn empty_screen_name_never_matches() {
        let set: IdentitySet = [("7", "")].into_iter().collect();
        assert!(!set.contains(&network("8", "")));
        assert!(!set.is_empty());
    }
}
