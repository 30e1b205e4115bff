//! TOML configuration: schema structs, loading, and assembly of the
//! running [`AppState`] from validated blocks.

use crate::actions::{Actionset, ActionsetDef, VerbParams};
use crate::error::FatalError;
use crate::input::InputServer;
use crate::session::{NoOpSessionLog, SessionLog};
use crate::state::{AppState, Toggles};
use crate::team::{Team, TeamDef, TeamRule};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Top-level configuration document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: SettingsBlock,
    #[serde(default)]
    pub actionsets: Vec<ActionsetBlock>,
    #[serde(default)]
    pub teams: Vec<TeamBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsBlock {
    /// Whether chat input is accepted from the start.
    #[serde(default = "default_true")]
    pub accept_input: bool,
    /// Whether idle random actions fire from the start.
    #[serde(default)]
    pub random_actions: bool,
    /// Extra randomized delay budget in milliseconds.
    #[serde(default)]
    pub random_delay_ms: u64,
    /// Operator usernames (may use special-group tokens).
    #[serde(default)]
    pub operators: Vec<String>,
    /// Directory snapshots are written to.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

impl Default for SettingsBlock {
    fn default() -> Self {
        Self {
            accept_input: true,
            random_actions: false,
            random_delay_ms: 0,
            operators: Vec::new(),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionsetBlock {
    pub name: String,
    #[serde(default)]
    pub doc_url: String,
    #[serde(default = "default_prefix")]
    pub action_prefix: String,
    #[serde(default)]
    pub player_index: usize,
    #[serde(default)]
    pub allow_changing_macros: bool,
    #[serde(default)]
    pub macro_file: Option<PathBuf>,
    #[serde(default)]
    pub persistent_macros: bool,
    #[serde(default)]
    pub verbs: Vec<VerbBlock>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Verb key -> device key per player slot.
    #[serde(default)]
    pub keys: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub random_verbs: Vec<RandomVerbBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerbBlock {
    pub name: String,
    pub inputs: Vec<VerbParams>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomVerbBlock {
    pub verb: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamBlock {
    pub name: String,
    pub channels: Vec<String>,
    /// Name of an `[[actionsets]]` block.
    pub actionset: String,
    /// Membership rule names, evaluated in order.
    #[serde(default)]
    pub rules: Vec<String>,
    /// Username pattern for the `name_pattern` rule.
    #[serde(default)]
    pub name_pattern: Option<String>,
    /// Outcome number for the `prediction_number` rule.
    #[serde(default)]
    pub prediction_number: Option<u8>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    #[serde(default)]
    pub use_random_inputs: bool,
    #[serde(default)]
    pub joinable: bool,
    #[serde(default)]
    pub leavable: bool,
    #[serde(default = "default_true")]
    pub exclusive: bool,
    #[serde(default = "default_true")]
    pub spam_protection: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "+".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_queue_length() -> usize {
    10
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

impl Config {
    /// Read and parse the config file. Schema errors surface here;
    /// semantic validation happens during [`build_state`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Cheap structural checks that don't need constructed components.
    fn check(&self) -> Result<(), ConfigError> {
        if self.teams.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[teams]] block is required".to_string(),
            ));
        }
        let mut actionset_names = HashSet::new();
        for block in &self.actionsets {
            if !actionset_names.insert(block.name.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate actionset name {:?}",
                    block.name
                )));
            }
        }
        for team in &self.teams {
            if !actionset_names.contains(&team.actionset.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "team {:?} references unknown actionset {:?}",
                    team.name, team.actionset
                )));
            }
        }
        Ok(())
    }
}

impl ActionsetBlock {
    fn into_def(self) -> ActionsetDef {
        ActionsetDef {
            name: self.name,
            doc_url: self.doc_url,
            action_prefix: self.action_prefix,
            player_index: self.player_index,
            allow_changing_macros: self.allow_changing_macros,
            macro_file: self.macro_file,
            persistent_macros: self.persistent_macros,
            verbs: self
                .verbs
                .into_iter()
                .map(|v| (v.name, v.inputs))
                .collect(),
            aliases: self.aliases.into_iter().collect(),
            keys: self.keys,
            random_verbs: self
                .random_verbs
                .into_iter()
                .map(|r| (r.verb, r.weight))
                .collect(),
        }
    }
}

impl TeamBlock {
    fn rules(&self) -> Result<Vec<TeamRule>, FatalError> {
        self.rules
            .iter()
            .map(|kind| {
                TeamRule::from_config(
                    kind,
                    &self.name,
                    self.name_pattern.as_deref(),
                    self.prediction_number,
                )
            })
            .collect()
    }
}

/// Construct teams and the state container from a parsed config.
///
/// Every team gets its own actionset instance (macro tables and player
/// indices are per-team state), all driven by the same input server.
pub fn build_state(
    config: Config,
    input_server: Arc<dyn InputServer>,
    session: Arc<dyn SessionLog>,
) -> Result<Arc<AppState>, FatalError> {
    let actionset_blocks: HashMap<String, ActionsetBlock> = config
        .actionsets
        .into_iter()
        .map(|block| (block.name.to_lowercase(), block))
        .collect();

    let mut teams = Vec::with_capacity(config.teams.len());
    for team_block in &config.teams {
        // Presence is guaranteed by Config::check.
        let actionset_block = actionset_blocks
            .get(&team_block.actionset.to_lowercase())
            .ok_or_else(|| FatalError::TeamCreation {
                team: team_block.name.clone(),
                reason: format!("unknown actionset {:?}", team_block.actionset),
            })?;
        let actionset = Actionset::new(
            actionset_block.clone().into_def(),
            Arc::clone(&input_server),
        )?;

        let def = TeamDef {
            name: team_block.name.clone(),
            channels: team_block
                .channels
                .iter()
                .map(|c| normalize_channel(c))
                .collect(),
            hidden: team_block.hidden,
            queue_length: team_block.queue_length,
            use_random_inputs: team_block.use_random_inputs,
            joinable: team_block.joinable,
            leavable: team_block.leavable,
            exclusive: team_block.exclusive,
            spam_protection: team_block.spam_protection,
            whitelist: team_block.whitelist.clone(),
            blacklist: team_block.blacklist.clone(),
            rules: team_block.rules()?,
        };
        teams.push(Team::new(def, actionset)?);
    }

    let toggles = Toggles::new(
        config.settings.accept_input,
        config.settings.random_actions,
        Duration::from_millis(config.settings.random_delay_ms),
    );
    let state = AppState::new(teams, toggles, session)?;

    {
        let mut operators = state.operators.lock();
        let all_channels: HashSet<String> = state
            .teams()
            .iter()
            .flat_map(|team| team.channels.iter().cloned())
            .collect();
        for entry in &config.settings.operators {
            operators.add_to_list(entry, &all_channels);
        }
    }

    info!(
        teams = state.teams().len(),
        accept_input = state.toggles.accept_input(),
        "application state assembled"
    );
    Ok(state)
}

/// Convenience wrapper used by the binary: parse + build with a no-op
/// session log.
pub fn load_state(
    path: &Path,
    input_server: Arc<dyn InputServer>,
) -> Result<Arc<AppState>, FatalError> {
    let config = Config::load(path)?;
    build_state(config, input_server, Arc::new(NoOpSessionLog))
}

fn normalize_channel(channel: &str) -> String {
    let lower = channel.to_lowercase();
    if lower.starts_with('#') {
        lower
    } else {
        format!("#{lower}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::LocalInputServer;

    const MINIMAL: &str = r#"
        [[actionsets]]
        name = "platformer"

        [actionsets.keys]
        left = ["KEY_LEFT"]
        right = ["KEY_RIGHT"]

        [[actionsets.verbs]]
        name = "left"
        inputs = [{ key = "left", duration = 150 }]

        [[actionsets.verbs]]
        name = "right"
        inputs = [{ key = "right", duration = 150 }]

        [[teams]]
        name = "Red"
        channels = ["somechannel"]
        actionset = "platformer"
        rules = ["everyone"]
    "#;

    #[test]
    fn test_minimal_config_builds() {
        let config = Config::from_toml(MINIMAL).unwrap();
        let state = build_state(
            config,
            Arc::new(LocalInputServer::new()),
            Arc::new(NoOpSessionLog),
        )
        .unwrap();
        let team = state.team_by_name("red").unwrap();
        assert!(team.channels.contains("#somechannel"));
        assert_eq!(team.actionset.name, "platformer");
    }

    #[test]
    fn test_no_teams_is_rejected() {
        let err = Config::from_toml("[settings]\naccept_input = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_actionset_reference_is_rejected() {
        let raw = r##"
            [[teams]]
            name = "Red"
            channels = ["#c"]
            actionset = "ghost"
        "##;
        assert!(matches!(
            Config::from_toml(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_rule_is_fatal() {
        let raw = r##"
            [[actionsets]]
            name = "empty"

            [[teams]]
            name = "Red"
            channels = ["#c"]
            actionset = "empty"
            rules = ["psychic"]
        "##;
        let config = Config::from_toml(raw).unwrap();
        let err = build_state(
            config,
            Arc::new(LocalInputServer::new()),
            Arc::new(NoOpSessionLog),
        )
        .err()
        .expect("unknown rule must fail state construction");
        assert!(matches!(err, FatalError::TeamCreation { .. }));
    }

    #[test]
    fn test_duplicate_team_names_are_fatal() {
        let raw = r##"
            [[actionsets]]
            name = "empty"

            [[teams]]
            name = "Red"
            channels = ["#c"]
            actionset = "empty"

            [[teams]]
            name = "RED"
            channels = ["#c"]
            actionset = "empty"
        "##;
        let config = Config::from_toml(raw).unwrap();
        let err = build_state(
            config,
            Arc::new(LocalInputServer::new()),
            Arc::new(NoOpSessionLog),
        )
        .err()
        .expect("duplicate team names must fail state construction");
        assert!(matches!(err, FatalError::DuplicateTeamName(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_operators_are_seeded() {
        let raw = r##"
            [settings]
            operators = ["streamer"]

            [[actionsets]]
            name = "empty"

            [[teams]]
            name = "Red"
            channels = ["#c"]
            actionset = "empty"
        "##;
        let config = Config::from_toml(raw).unwrap();
        let state = build_state(
            config,
            Arc::new(LocalInputServer::new()),
            Arc::new(NoOpSessionLog),
        )
        .unwrap();
        assert_eq!(state.operators.lock().user_in_list("streamer"), Some(true));
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_toml("not = [valid"),
            Err(ConfigError::Parse(_))
        ));
    }
}
