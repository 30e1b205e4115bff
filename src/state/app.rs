//! The per-process application state container.

use crate::chat::ChatMessage;
use crate::error::FatalError;
use crate::session::{NoOpSessionLog, SessionLog};
use crate::state::{Toggles, UserRegistry};
use crate::team::Team;
use crate::userdata::UserList;
use dashmap::DashSet;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the router, team loops and command layer share.
///
/// Built once at startup; teams are fixed for the process lifetime, only
/// their internal state (members, lists, macros, queues) changes.
pub struct AppState {
    /// Teams in registration order (the router's fallback scan order).
    teams: Vec<Arc<Team>>,
    /// Lowercased name -> index into `teams`.
    by_name: HashMap<String, usize>,
    /// Every registered action prefix, for the router's cheap pre-filter.
    action_prefixes: Vec<String>,
    pub users: UserRegistry,
    pub toggles: Toggles,
    /// Operator usernames, maintained by the command layer.
    pub operators: Mutex<UserList>,
    /// Player slots with an attached virtual gamepad.
    pub gamepads: DashSet<usize>,
    pub session: Arc<dyn SessionLog>,
}

impl AppState {
    /// Assemble the state container, rejecting duplicate team names
    /// (compared case-insensitively) as a fatal configuration error.
    pub fn new(
        teams: Vec<Arc<Team>>,
        toggles: Toggles,
        session: Arc<dyn SessionLog>,
    ) -> Result<Arc<Self>, FatalError> {
        let mut by_name = HashMap::with_capacity(teams.len());
        let mut action_prefixes: Vec<String> = Vec::new();
        for (index, team) in teams.iter().enumerate() {
            let lower = team.name.to_lowercase();
            if by_name.insert(lower, index).is_some() {
                return Err(FatalError::DuplicateTeamName(team.name.clone()));
            }
            let prefix = &team.actionset.action_prefix;
            if !action_prefixes.contains(prefix) {
                action_prefixes.push(prefix.clone());
            }
        }
        Ok(Arc::new(Self {
            teams,
            by_name,
            action_prefixes,
            users: UserRegistry::new(),
            toggles,
            operators: Mutex::new(UserList::default()),
            gamepads: DashSet::new(),
            session,
        }))
    }

    /// Minimal state for unit tests: given teams, default toggles with
    /// input accepted, no session log.
    pub fn for_teams(teams: Vec<Arc<Team>>) -> Result<Arc<Self>, FatalError> {
        let toggles = Toggles::default();
        toggles.set_accept_input(true);
        Self::new(teams, toggles, Arc::new(NoOpSessionLog))
    }

    pub fn teams(&self) -> &[Arc<Team>] {
        &self.teams
    }

    /// Case-insensitive team lookup.
    pub fn team_by_name(&self, name: &str) -> Option<&Arc<Team>> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&index| &self.teams[index])
    }

    /// Original-case team names, hidden teams excluded.
    pub fn visible_team_names(&self) -> Vec<String> {
        self.teams
            .iter()
            .filter(|team| !team.hidden)
            .map(|team| team.name.clone())
            .collect()
    }

    /// Whether the text starts with any registered action prefix.
    pub fn message_is_action(&self, msg: &ChatMessage) -> bool {
        self.action_prefixes
            .iter()
            .any(|prefix| msg.text.starts_with(prefix))
    }

    /// Remove all users from all teams and forget every ownership claim.
    ///
    /// Returns true when at least one team actually had members.
    pub fn clear_team_members(&self) -> bool {
        let mut had_members = false;
        for team in &self.teams {
            had_members |= team.clear_members(self);
        }
        self.users.clear();
        had_members
    }
}
