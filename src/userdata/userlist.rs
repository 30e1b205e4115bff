//! Membership lists with fixed users, dynamic groups and a verdict cache.

use crate::chat::ChatMessage;
use crate::userdata::SpecialGroup;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A user list combining explicit usernames with per-channel group rules.
///
/// Verdicts are cached per user. The cache is only trustworthy while the
/// group rules stay unchanged, so every group mutation invalidates it.
#[derive(Debug)]
pub struct UserList {
    cache_users: bool,
    /// Users whose verdict has been computed at least once.
    known_users: HashSet<String>,
    /// Subset of `known_users` whose verdict was positive.
    included_users: HashSet<String>,
    /// Explicitly listed usernames, always included.
    fixed_users: HashSet<String>,
    /// Group -> channels the group rule is active for.
    groups: HashMap<SpecialGroup, HashSet<String>>,
}

/// Serializable form of a [`UserList`] for snapshot files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserListSnapshot {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for UserList {
    fn default() -> Self {
        Self::new(true)
    }
}

impl UserList {
    pub fn new(cache_users: bool) -> Self {
        Self {
            cache_users,
            known_users: HashSet::new(),
            included_users: HashSet::new(),
            fixed_users: HashSet::new(),
            groups: HashMap::new(),
        }
    }

    /// Reset to the freshly-constructed state.
    pub fn clear(&mut self) {
        let cache_users = self.cache_users;
        *self = Self::new(cache_users);
    }

    /// Add an entry: either a group token or a literal username.
    ///
    /// A group token without an explicit channel activates the group for
    /// every channel in `default_channels`. Group changes invalidate the
    /// verdict cache; literal users are cached as included immediately.
    pub fn add_to_list(&mut self, entry: &str, default_channels: &HashSet<String>) {
        let entry = entry.to_lowercase();
        match SpecialGroup::parse_entry(&entry) {
            Some((group, channel)) => {
                let channels = self.groups.entry(group).or_default();
                match channel {
                    Some(chan) => {
                        channels.insert(chan);
                    }
                    None => channels.extend(default_channels.iter().cloned()),
                }
                self.known_users.clear();
            }
            None => {
                self.fixed_users.insert(entry.clone());
                self.included_users.insert(entry.clone());
                self.known_users.insert(entry);
            }
        }
    }

    /// Remove an entry, symmetric to [`add_to_list`](Self::add_to_list).
    ///
    /// Group removal also clears `included_users`: a cached positive
    /// verdict may have come from the removed group, so nothing cached
    /// survives. Literal removal only drops the user from the cache (a
    /// group rule could still include them).
    pub fn remove_from_list(&mut self, entry: &str, default_channels: &HashSet<String>) {
        let entry = entry.to_lowercase();
        match SpecialGroup::parse_entry(&entry) {
            Some((group, channel)) => {
                if let Some(channels) = self.groups.get_mut(&group) {
                    match channel {
                        Some(chan) => {
                            channels.remove(&chan);
                        }
                        None => {
                            for chan in default_channels {
                                channels.remove(chan);
                            }
                        }
                    }
                }
                self.known_users.clear();
                self.included_users.clear();
            }
            None => {
                self.fixed_users.remove(&entry);
                self.included_users.remove(&entry);
                self.known_users.remove(&entry);
            }
        }
    }

    /// Full membership check with access to the message's channel and tags.
    pub fn message_in_list(&mut self, msg: &ChatMessage) -> bool {
        if self.cache_users && self.known_users.contains(&msg.user) {
            return self.included_users.contains(&msg.user);
        }
        if self.fixed_users.contains(&msg.user) || self.matches_any_group(msg) {
            self.included_users.insert(msg.user.clone());
            self.known_users.insert(msg.user.clone());
            return true;
        }
        self.known_users.insert(msg.user.clone());
        false
    }

    /// Membership check by bare username.
    ///
    /// Group rules need a message's tags to evaluate, so without a cached
    /// verdict or a fixed entry the answer is unknown (`None`), never a
    /// guess.
    pub fn user_in_list(&mut self, user: &str) -> Option<bool> {
        if self.cache_users && self.known_users.contains(user) {
            return Some(self.included_users.contains(user));
        }
        if self.fixed_users.contains(user) {
            self.included_users.insert(user.to_string());
            self.known_users.insert(user.to_string());
            return Some(true);
        }
        None
    }

    fn matches_any_group(&self, msg: &ChatMessage) -> bool {
        self.groups.iter().any(|(group, channels)| {
            !channels.is_empty() && channels.contains(&msg.channel) && group.matches(msg)
        })
    }

    /// Export for snapshot persistence.
    pub fn export(&self) -> UserListSnapshot {
        let mut users: Vec<String> = self.fixed_users.iter().cloned().collect();
        users.sort();
        let groups = self
            .groups
            .iter()
            .map(|(group, channels)| {
                let mut channels: Vec<String> = channels.iter().cloned().collect();
                channels.sort();
                (group.token().to_string(), channels)
            })
            .collect();
        UserListSnapshot { users, groups }
    }

    /// Import from a snapshot. Only adds entries, never clears existing
    /// ones; always invalidates the cache afterward.
    pub fn import(&mut self, snapshot: &UserListSnapshot) {
        for user in &snapshot.users {
            self.fixed_users.insert(user.to_lowercase());
        }
        for (token, channels) in &snapshot.groups {
            if let Some(group) = SpecialGroup::from_token(token) {
                self.groups
                    .entry(group)
                    .or_default()
                    .extend(channels.iter().cloned());
            }
        }
        self.known_users.clear();
        self.included_users.clear();
    }
}
