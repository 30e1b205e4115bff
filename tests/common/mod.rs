//! Shared fixtures for the integration tests: a recording input server,
//! a message factory and canned team/state builders.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use crowdpilot::actions::{Actionset, ActionsetDef, VerbParams};
use crowdpilot::chat::{ChatMessage, MessageKind};
use crowdpilot::input::{Action, InputError, InputServer};
use crowdpilot::state::AppState;
use crowdpilot::team::{Team, TeamDef, TeamRule};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const CHANNEL: &str = "#arena";

/// Input server that records every executed action instead of pressing
/// keys; optionally refuses connections to exercise fail-stop.
#[derive(Default)]
pub struct RecordingInputServer {
    executed: Mutex<Vec<Action>>,
    refuse: AtomicBool,
}

impl RecordingInputServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<Action> {
        self.executed.lock().clone()
    }

    /// Executed input actions only, sleeps filtered out.
    pub fn executed_inputs(&self) -> Vec<Action> {
        self.executed
            .lock()
            .iter()
            .filter(|action| matches!(action, Action::Input(_)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InputServer for RecordingInputServer {
    async fn execute(&self, action: &Action) -> Result<(), InputError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(InputError::ConnectionRefused);
        }
        self.executed.lock().push(action.clone());
        // Honor the input-server contract for sleeps (as LocalInputServer
        // does) so worker loops don't spin unthrottled in tests.
        if let Action::Sleep(duration) = action {
            tokio::time::sleep(*duration).await;
        }
        Ok(())
    }

    async fn add_gamepad(&self, _player_index: usize) -> Result<(), InputError> {
        Ok(())
    }

    async fn remove_gamepad(&self, _player_index: usize) -> Result<(), InputError> {
        Ok(())
    }
}

/// Directional actionset with default timing, driven by `server`.
pub fn actionset(server: Arc<dyn InputServer>) -> Actionset {
    actionset_with(server, |_| {})
}

/// Same, with a hook to tweak the definition before construction.
pub fn actionset_with(
    server: Arc<dyn InputServer>,
    tweak: impl FnOnce(&mut ActionsetDef),
) -> Actionset {
    let mut def = ActionsetDef {
        name: "directional".to_string(),
        verbs: vec![
            ("left".to_string(), vec![VerbParams::press("left", 150)]),
            ("right".to_string(), vec![VerbParams::press("right", 150)]),
        ],
        keys: HashMap::from([
            ("left".to_string(), vec!["KEY_LEFT".to_string()]),
            ("right".to_string(), vec!["KEY_RIGHT".to_string()]),
        ]),
        ..Default::default()
    };
    tweak(&mut def);
    Actionset::new(def, server).expect("fixture actionset is valid")
}

/// Exclusive everyone-team on [`CHANNEL`].
pub fn team(name: &str, server: Arc<dyn InputServer>) -> Arc<Team> {
    team_with(name, server, |_| {})
}

pub fn team_with(
    name: &str,
    server: Arc<dyn InputServer>,
    tweak: impl FnOnce(&mut TeamDef),
) -> Arc<Team> {
    let mut def = TeamDef {
        name: name.to_string(),
        channels: HashSet::from([CHANNEL.to_string()]),
        rules: vec![TeamRule::Everyone],
        ..Default::default()
    };
    tweak(&mut def);
    Team::new(def, actionset(server)).expect("fixture team is valid")
}

pub fn state(teams: Vec<Arc<Team>>) -> Arc<AppState> {
    AppState::for_teams(teams).expect("fixture state is valid")
}

/// A plain chat message on [`CHANNEL`] with no tags.
pub fn msg(user: &str, text: &str) -> ChatMessage {
    ChatMessage::new(MessageKind::Privmsg, user, CHANNEL, text, HashMap::new())
}
