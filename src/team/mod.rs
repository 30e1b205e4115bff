//! Teams: bounded queues, membership decisions and the two worker loops.

mod router;
mod snapshot;
mod strategy;

pub use router::route_message;
pub use snapshot::{Snapshot, SnapshotError, TeamSnapshot, load_snapshot, save_snapshot};
pub use strategy::{PredictionSide, TeamRule};

use crate::actions::Actionset;
use crate::chat::ChatMessage;
use crate::error::FatalError;
use crate::input::{Action, InputAction, InputError};
use crate::quadstate::Quadstate;
use crate::state::AppState;
use crate::userdata::UserList;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// How long a loop sleeps when its queue has nothing for it.
pub const EMPTY_QUEUE_SLEEP: Duration = Duration::from_millis(10);

const DEFAULT_QUEUE_LENGTH: usize = 10;

/// Construction parameters for a [`Team`].
#[derive(Debug, Clone)]
pub struct TeamDef {
    pub name: String,
    pub channels: HashSet<String>,
    pub hidden: bool,
    pub queue_length: usize,
    pub use_random_inputs: bool,
    pub joinable: bool,
    pub leavable: bool,
    pub exclusive: bool,
    pub spam_protection: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    /// Membership strategies, evaluated in order. Empty means the base
    /// rule only (members and whitelist).
    pub rules: Vec<TeamRule>,
}

impl Default for TeamDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            channels: HashSet::new(),
            hidden: false,
            queue_length: DEFAULT_QUEUE_LENGTH,
            use_random_inputs: false,
            joinable: false,
            leavable: false,
            exclusive: true,
            spam_protection: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// One configured team: owns its actionset, user lists, two bounded
/// queues and the pair of worker loops feeding the input server.
pub struct Team {
    pub name: String,
    /// Lowercased name, the identity used in the user registry.
    name_key: String,
    pub channels: HashSet<String>,
    pub actionset: Actionset,
    pub hidden: bool,
    pub use_random_inputs: bool,
    pub joinable: bool,
    pub leavable: bool,
    pub exclusive: bool,
    pub spam_protection: bool,
    pub whitelist: Mutex<UserList>,
    pub blacklist: Mutex<UserList>,
    members: Mutex<HashSet<String>>,
    rules: Vec<TeamRule>,
    /// Set when a `nobody` rule is present: the loops idle and the
    /// actionset never runs.
    inert: bool,
    /// Set when a `random_only` rule is present: idle random actions fire
    /// whenever input is accepted, regardless of `use_random_inputs`.
    random_only: bool,
    queue_length: usize,
    message_queue: Mutex<VecDeque<ChatMessage>>,
    action_queue: Mutex<VecDeque<(ChatMessage, InputAction)>>,
    keep_running: AtomicBool,
}

impl Team {
    pub fn new(def: TeamDef, actionset: Actionset) -> Result<Arc<Self>, FatalError> {
        if def.name.is_empty() {
            return Err(FatalError::TeamCreation {
                team: "<unnamed>".to_string(),
                reason: "team name must be provided".to_string(),
            });
        }
        if def.channels.is_empty() {
            return Err(FatalError::TeamCreation {
                team: def.name,
                reason: "at least one channel is required".to_string(),
            });
        }

        let mut whitelist = UserList::default();
        for entry in &def.whitelist {
            whitelist.add_to_list(entry, &def.channels);
        }
        let mut blacklist = UserList::default();
        for entry in &def.blacklist {
            blacklist.add_to_list(entry, &def.channels);
        }

        let inert = def.rules.iter().any(|r| matches!(r, TeamRule::Nobody));
        let random_only = def.rules.iter().any(|r| matches!(r, TeamRule::RandomOnly));

        Ok(Arc::new(Self {
            name_key: def.name.to_lowercase(),
            name: def.name,
            channels: def.channels,
            actionset,
            hidden: def.hidden,
            use_random_inputs: def.use_random_inputs,
            joinable: def.joinable,
            leavable: def.leavable,
            exclusive: def.exclusive,
            spam_protection: def.spam_protection,
            whitelist: Mutex::new(whitelist),
            blacklist: Mutex::new(blacklist),
            members: Mutex::new(HashSet::new()),
            rules: def.rules,
            inert,
            random_only,
            queue_length: def.queue_length,
            message_queue: Mutex::new(VecDeque::with_capacity(def.queue_length)),
            action_queue: Mutex::new(VecDeque::with_capacity(def.queue_length)),
            keep_running: AtomicBool::new(true),
        }))
    }

    /// The registry identity of this team (lowercased name).
    pub fn key(&self) -> &str {
        &self.name_key
    }

    pub fn has_balancing_rule(&self) -> bool {
        self.rules.iter().any(|r| matches!(r, TeamRule::Balancing))
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn is_member(&self, user: &str) -> bool {
        self.members.lock().contains(user)
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// Voluntary join via chat command; only possible for joinable
    /// exclusive teams, and only when no other team owns the user.
    pub fn join_team(&self, state: &AppState, user: &str) -> bool {
        if !(self.joinable && self.exclusive) {
            return false;
        }
        if !state.users.claim(user, &self.name_key) {
            return false;
        }
        self.members.lock().insert(user.to_string());
        true
    }

    /// Voluntary leave. True iff the user was a member and isn't now.
    pub fn leave_team(&self, state: &AppState, user: &str) -> bool {
        if !self.leavable {
            return false;
        }
        if self.members.lock().remove(user) {
            state.users.release(user, &self.name_key);
            return true;
        }
        false
    }

    /// Drop membership and any registry claim held by this team.
    pub(crate) fn evict(&self, state: &AppState, user: &str) {
        self.members.lock().remove(user);
        state.users.release(user, &self.name_key);
    }

    /// Remove every member. True if there was at least one.
    pub fn clear_members(&self, state: &AppState) -> bool {
        let drained: Vec<String> = {
            let mut members = self.members.lock();
            members.drain().collect()
        };
        for user in &drained {
            state.users.release(user, &self.name_key);
        }
        !drained.is_empty()
    }

    /// EXCLUSION gate: is this message/user denied membership here?
    ///
    /// Triggering an exclusion also evicts the user if they were
    /// (illegitimately) a member.
    pub fn blocked_from_team(&self, state: &AppState, msg: &ChatMessage) -> bool {
        let blacklisted = self.blacklist.lock().message_in_list(msg);
        let owned_elsewhere = self.exclusive
            && state
                .users
                .team_of(&msg.user)
                .is_some_and(|owner| owner != self.name_key);
        if blacklisted || owned_elsewhere {
            self.evict(state, &msg.user);
            return true;
        }
        self.rules
            .iter()
            .any(|rule| rule.blocks(self, state, msg))
    }

    /// INCLUSION gate: does this message belong on this team?
    pub fn belongs_to_team(&self, state: &AppState, msg: &ChatMessage) -> bool {
        self.membership_vote(state, msg).as_bool()
    }

    /// Short-circuiting fold over the membership voters: the base vote
    /// first (members and whitelist are certain), then each configured
    /// rule in order until one is certain of its verdict.
    fn membership_vote(&self, state: &AppState, msg: &ChatMessage) -> Quadstate {
        let mut verdict = if self.is_member(&msg.user)
            || self.whitelist.lock().message_in_list(msg)
        {
            Quadstate::AbsolutelyTrue
        } else {
            Quadstate::MaybeFalse
        };
        for rule in &self.rules {
            if verdict.is_certain() {
                break;
            }
            if let Some(vote) = rule.vote(self, state, msg) {
                verdict = vote;
            }
        }
        verdict
    }

    // ------------------------------------------------------------------
    // Queue admission
    // ------------------------------------------------------------------

    /// Admit a message to the queue and, for exclusive teams, record the
    /// sender as a member.
    ///
    /// With spam protection on, a message matching a queued message's user
    /// and text is silently dropped. The queue is bounded; the oldest
    /// entry is evicted when full, which is harmless under the
    /// most-recent-wins draining discipline.
    pub fn add_message(&self, state: &AppState, msg: ChatMessage) {
        let user = msg.user.clone();
        {
            let mut queue = self.message_queue.lock();
            if self.spam_protection
                && queue
                    .iter()
                    .any(|queued| queued.user == msg.user && queued.text == msg.text)
            {
                return;
            }
            if queue.len() >= self.queue_length {
                queue.pop_front();
            }
            queue.push_back(msg);
        }
        if self.exclusive
            && !self.is_member(&user)
            && state.users.claim(&user, &self.name_key)
        {
            self.members.lock().insert(user);
        }
    }

    /// Number of currently queued messages (test/introspection hook).
    pub fn queued_messages(&self) -> usize {
        self.message_queue.lock().len()
    }

    /// Number of currently queued actions (test/introspection hook).
    pub fn queued_actions(&self) -> usize {
        self.action_queue.lock().len()
    }

    // ------------------------------------------------------------------
    // Worker loops
    // ------------------------------------------------------------------

    /// Launch the translate and execute loops. The returned handles are
    /// awaited (with a timeout) at shutdown.
    pub fn start(self: &Arc<Self>, state: Arc<AppState>) -> Vec<JoinHandle<()>> {
        self.keep_running.store(true, Ordering::SeqCst);
        let translate = {
            let team = Arc::clone(self);
            tokio::spawn(async move { team.translate_loop().await })
        };
        let execute = {
            let team = Arc::clone(self);
            tokio::spawn(async move { team.execute_loop(state).await })
        };
        vec![translate, execute]
    }

    /// Request cooperative shutdown of both loops.
    pub fn stop(&self) {
        self.keep_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    async fn translate_loop(self: Arc<Self>) {
        while self.is_running() {
            if self.inert {
                tokio::time::sleep(EMPTY_QUEUE_SLEEP).await;
                continue;
            }
            self.translate_once().await;
        }
    }

    /// One translate cycle: pop the most recent message; on successful
    /// translation push the action and discard every other pending
    /// message (most-recent-wins). A failed translation discards nothing
    /// so producers get a chance to refill the queue.
    pub async fn translate_once(&self) {
        let popped = self.message_queue.lock().pop_back();
        let Some(msg) = popped else {
            tokio::time::sleep(EMPTY_QUEUE_SLEEP).await;
            return;
        };
        let Some(action) = self.actionset.translate_user_message_to_action(&msg) else {
            return;
        };
        {
            let mut queue = self.action_queue.lock();
            if queue.len() >= self.queue_length {
                queue.pop_front();
            }
            queue.push_back((msg, action));
        }
        self.message_queue.lock().clear();
    }

    async fn execute_loop(self: Arc<Self>, state: Arc<AppState>) {
        while self.is_running() {
            if self.inert {
                tokio::time::sleep(EMPTY_QUEUE_SLEEP).await;
                continue;
            }
            self.execute_once(&state).await;
        }
    }

    /// One execute cycle: pop the most recent action (discarding the
    /// rest), or fall back to the empty-queue action, and deliver it.
    /// Connection refusal from the input server is fail-stop for this
    /// team only.
    pub async fn execute_once(&self, state: &AppState) {
        let popped = {
            let mut queue = self.action_queue.lock();
            let item = queue.pop_back();
            if item.is_some() {
                queue.clear();
            }
            item
        };

        let action = match popped {
            Some((msg, input)) => {
                let jitter = execution_jitter(state);
                if !jitter.is_zero() {
                    tokio::time::sleep(jitter).await;
                }
                info!(
                    team = %self.name,
                    actionset = %self.actionset.name,
                    player = self.actionset.player_index,
                    user = %msg.user,
                    text = %msg.text,
                    "executing chat action"
                );
                state.session.log_executed_message(&msg, &self.name);
                Action::Input(input)
            }
            None => self.empty_queue_action(state),
        };

        match self.actionset.input_server.execute(&action).await {
            Ok(()) => {}
            Err(InputError::ConnectionRefused) => {
                self.stop();
                error!(
                    team = %self.name,
                    "remote input server refused connection, stopping input handling"
                );
            }
            Err(e) => {
                tracing::warn!(team = %self.name, error = %e, "input delivery failed");
            }
        }
    }

    /// What to run when the action queue is empty: a short sleep, or a
    /// random action when random inputs apply.
    pub fn empty_queue_action(&self, state: &AppState) -> Action {
        let random_active = if self.random_only {
            state.toggles.accept_input() || state.toggles.random_action()
        } else {
            self.use_random_inputs && state.toggles.random_action()
        };
        if random_active && self.actionset.has_random_actions() {
            Action::Input(self.actionset.random_action())
        } else {
            Action::Sleep(EMPTY_QUEUE_SLEEP)
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Capture members, both user lists and the macro table as one unit.
    pub fn create_snapshot(&self) -> TeamSnapshot {
        TeamSnapshot {
            members: self.member_names(),
            whitelist: self.whitelist.lock().export(),
            blacklist: self.blacklist.lock().export(),
            macros: self.actionset.get_macros(),
        }
    }

    /// Restore a snapshot, overwriting members and macros and merging the
    /// user lists (imports only add).
    pub fn restore_snapshot(&self, snapshot: &TeamSnapshot) {
        *self.members.lock() = snapshot.members.iter().cloned().collect();
        self.whitelist.lock().import(&snapshot.whitelist);
        self.blacklist.lock().import(&snapshot.blacklist);
        self.actionset.set_macros(snapshot.macros.clone());
    }
}

/// Extra randomized delay before a crowd action executes, drawn uniformly
/// from the global delay budget. Zero budget means no jitter.
fn execution_jitter(state: &AppState) -> Duration {
    let budget = state.toggles.random_delay();
    if budget.is_zero() {
        return Duration::ZERO;
    }
    budget.mul_f64(rand::random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionsetDef, VerbParams};
    use crate::chat::MessageKind;
    use crate::input::LocalInputServer;
    use std::collections::HashMap;

    fn test_actionset() -> Actionset {
        let def = ActionsetDef {
            name: "test".into(),
            verbs: vec![("left".into(), vec![VerbParams::press("left", 150)])],
            keys: HashMap::from([("left".into(), vec!["left".into()])]),
            random_verbs: vec![("left".into(), 1.0)],
            ..Default::default()
        };
        Actionset::new(def, Arc::new(LocalInputServer::new())).unwrap()
    }

    fn test_team(name: &str, rules: Vec<TeamRule>) -> Arc<Team> {
        let def = TeamDef {
            name: name.into(),
            channels: HashSet::from(["#chan".to_string()]),
            rules,
            ..Default::default()
        };
        Team::new(def, test_actionset()).unwrap()
    }

    fn msg(user: &str, text: &str) -> ChatMessage {
        ChatMessage::new(MessageKind::Privmsg, user, "#chan", text, HashMap::new())
    }

    #[test]
    fn test_empty_name_is_fatal() {
        let def = TeamDef {
            channels: HashSet::from(["#chan".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            Team::new(def, test_actionset()),
            Err(FatalError::TeamCreation { .. })
        ));
    }

    #[test]
    fn test_no_channels_is_fatal() {
        let def = TeamDef {
            name: "Red".into(),
            ..Default::default()
        };
        assert!(matches!(
            Team::new(def, test_actionset()),
            Err(FatalError::TeamCreation { .. })
        ));
    }

    #[test]
    fn test_spam_protection_drops_duplicates() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.add_message(&state, msg("spammer", "+left"));
        team.add_message(&state, msg("spammer", "+left"));
        team.add_message(&state, msg("spammer", "+left 150"));
        assert_eq!(team.queued_messages(), 2);
    }

    #[test]
    fn test_add_message_records_exclusive_membership() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.add_message(&state, msg("newuser", "+left"));
        assert!(team.is_member("newuser"));
        assert_eq!(state.users.team_of("newuser").as_deref(), Some("red"));
    }

    #[test]
    fn test_bounded_queue_evicts_oldest() {
        let def = TeamDef {
            name: "Red".into(),
            channels: HashSet::from(["#chan".to_string()]),
            queue_length: 3,
            spam_protection: false,
            rules: vec![TeamRule::Everyone],
            ..Default::default()
        };
        let team = Team::new(def, test_actionset()).unwrap();
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        for i in 0..5 {
            team.add_message(&state, msg(&format!("user{i}"), "+left"));
        }
        assert_eq!(team.queued_messages(), 3);
    }

    #[tokio::test]
    async fn test_translate_once_leaves_queue_empty() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        for i in 0..4 {
            team.add_message(&state, msg(&format!("user{i}"), "+left"));
        }
        team.translate_once().await;
        assert_eq!(team.queued_messages(), 0);
        assert_eq!(team.queued_actions(), 1);
    }

    #[tokio::test]
    async fn test_translate_once_keeps_queue_on_failed_translation() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.add_message(&state, msg("a", "+left"));
        // Spam check compares text, so a different user's junk coexists.
        team.add_message(&state, msg("b", "+junkverb"));
        team.translate_once().await;
        // The junk message (most recent) was consumed, the older one stays.
        assert_eq!(team.queued_messages(), 1);
        assert_eq!(team.queued_actions(), 0);
    }

    #[test]
    fn test_blacklist_blocks_and_evicts() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.add_message(&state, msg("baduser", "+left"));
        assert!(team.is_member("baduser"));

        team.blacklist
            .lock()
            .add_to_list("baduser", &team.channels);
        assert!(team.blocked_from_team(&state, &msg("baduser", "+left")));
        assert!(!team.is_member("baduser"));
        assert!(state.users.team_of("baduser").is_none());
    }

    #[test]
    fn test_whitelisted_user_belongs() {
        let team = test_team("Red", vec![TeamRule::Nobody]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.whitelist.lock().add_to_list("vip", &team.channels);
        assert!(team.belongs_to_team(&state, &msg("vip", "+left")));
        assert!(!team.belongs_to_team(&state, &msg("pleb", "+left")));
    }

    #[test]
    fn test_join_and_leave() {
        let def = TeamDef {
            name: "Red".into(),
            channels: HashSet::from(["#chan".to_string()]),
            joinable: true,
            leavable: true,
            rules: vec![TeamRule::Everyone],
            ..Default::default()
        };
        let team = Team::new(def, test_actionset()).unwrap();
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        assert!(team.join_team(&state, "user"));
        assert!(team.is_member("user"));
        assert!(team.leave_team(&state, "user"));
        assert!(!team.is_member("user"));
        assert!(!team.leave_team(&state, "user"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.add_message(&state, msg("member1", "+left"));
        team.whitelist.lock().add_to_list("vip", &team.channels);

        let snapshot = team.create_snapshot();
        let restored = test_team("Red2", vec![TeamRule::Everyone]);
        restored.restore_snapshot(&snapshot);

        assert!(restored.is_member("member1"));
        assert_eq!(
            restored.whitelist.lock().user_in_list("vip"),
            Some(true)
        );
    }

    #[test]
    fn test_empty_queue_action_sleeps_by_default() {
        let team = test_team("Red", vec![TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        assert!(matches!(
            team.empty_queue_action(&state),
            Action::Sleep(_)
        ));
    }

    #[test]
    fn test_empty_queue_action_random_when_enabled() {
        let def = TeamDef {
            name: "Red".into(),
            channels: HashSet::from(["#chan".to_string()]),
            use_random_inputs: true,
            rules: vec![TeamRule::Everyone],
            ..Default::default()
        };
        let team = Team::new(def, test_actionset()).unwrap();
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        state.toggles.set_random_action(true);
        assert!(matches!(
            team.empty_queue_action(&state),
            Action::Input(_)
        ));
    }

    #[test]
    fn test_execution_jitter_respects_delay_budget() {
        let state = AppState::for_teams(Vec::new()).unwrap();
        assert_eq!(execution_jitter(&state), Duration::ZERO);

        let budget = Duration::from_millis(200);
        state.toggles.set_random_delay(budget);
        for _ in 0..50 {
            assert!(execution_jitter(&state) < budget);
        }
    }

    #[test]
    fn test_random_only_rule_fires_on_accept_input() {
        let team = test_team("Idle", vec![TeamRule::RandomOnly]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        // accept_input is on, random_action off, use_random_inputs off.
        assert!(matches!(
            team.empty_queue_action(&state),
            Action::Input(_)
        ));
    }
}
