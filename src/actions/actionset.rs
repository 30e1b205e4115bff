//! The per-team chat-to-input translator.

use crate::actions::macros::{MacroFile, log_macro_diff};
use crate::actions::verb::clamp;
use crate::actions::{InputType, ParsedVerb, VerbParams, parse_action_text};
use crate::chat::ChatMessage;
use crate::error::FatalError;
use crate::input::{InputAction, InputServer, KeyEvent, KeyInput};
use parking_lot::RwLock;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tracing::{error, warn};

static MACRO_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("macro name regex is valid"));

/// Everything needed to construct an [`Actionset`]; per-game data, usually
/// deserialized from config.
#[derive(Debug, Clone)]
pub struct ActionsetDef {
    pub name: String,
    pub doc_url: String,
    pub action_prefix: String,
    pub player_index: usize,
    pub allow_changing_macros: bool,
    pub macro_file: Option<PathBuf>,
    pub persistent_macros: bool,
    /// Base verbs in chat order: verb name -> sub-action parameters.
    pub verbs: Vec<(String, Vec<VerbParams>)>,
    /// Alias -> existing base verb.
    pub aliases: Vec<(String, String)>,
    /// Verb key -> device key per player slot.
    pub keys: HashMap<String, Vec<String>>,
    /// Weighted verb strings for the idle random fallback.
    pub random_verbs: Vec<(String, f64)>,
}

impl Default for ActionsetDef {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            doc_url: String::new(),
            action_prefix: "+".to_string(),
            player_index: 0,
            allow_changing_macros: false,
            macro_file: None,
            persistent_macros: false,
            verbs: Vec::new(),
            aliases: Vec::new(),
            keys: HashMap::new(),
            random_verbs: Vec::new(),
        }
    }
}

/// Stateless-per-message translator from chat text to input actions.
///
/// The verb table is fixed after construction; only the macro table can
/// change at runtime (chat commands), so it sits behind its own lock.
pub struct Actionset {
    pub name: String,
    pub doc_url: String,
    pub action_prefix: String,
    pub player_index: usize,
    pub allow_changing_macros: bool,
    pub macro_file: Option<PathBuf>,
    pub persistent_macros: bool,
    pub input_server: Arc<dyn InputServer>,
    /// Expanded verb table: base verbs, aliases, hold_/release_ variants,
    /// each in bare and prefixed form.
    verbs: HashMap<String, Vec<VerbParams>>,
    keys: HashMap<String, Vec<String>>,
    macros: RwLock<HashMap<String, Vec<VerbParams>>>,
    random_verbs: Vec<String>,
    random_weights: Vec<f64>,
}

impl Actionset {
    pub fn new(def: ActionsetDef, input_server: Arc<dyn InputServer>) -> Result<Self, FatalError> {
        let verbs = expand_verb_table(&def)?;

        let (random_verbs, random_weights) = def.random_verbs.into_iter().unzip();
        let actionset = Self {
            name: def.name,
            doc_url: def.doc_url,
            action_prefix: def.action_prefix,
            player_index: def.player_index,
            allow_changing_macros: def.allow_changing_macros,
            macro_file: def.macro_file,
            persistent_macros: def.persistent_macros,
            input_server,
            verbs,
            keys: def.keys,
            macros: RwLock::new(HashMap::new()),
            random_verbs,
            random_weights,
        };
        actionset.validate()?;
        actionset.load_macros_from_file();
        Ok(actionset)
    }

    /// Internal-consistency checks; anything caught here is a
    /// configuration bug, not a runtime condition.
    fn validate(&self) -> Result<(), FatalError> {
        let fail = |reason: String| FatalError::ActionsetValidation {
            actionset: self.name.clone(),
            reason,
        };
        for (verb, params) in &self.verbs {
            for param in params {
                let Some(device_keys) = self.keys.get(&param.key) else {
                    return Err(fail(format!(
                        "key '{}' of verb '{verb}' is missing from the key map",
                        param.key
                    )));
                };
                if self.player_index >= device_keys.len() {
                    return Err(fail(format!(
                        "player index {} exceeds the key map arity for key '{}'",
                        self.player_index, param.key
                    )));
                }
                if param.min_time > param.max_time {
                    return Err(fail(format!(
                        "min_time > max_time for key '{}' of verb '{verb}'",
                        param.key
                    )));
                }
                if param.delay + param.duration > param.max_time {
                    return Err(fail(format!(
                        "default delay + duration > max_time for key '{}' of verb '{verb}'",
                        param.key
                    )));
                }
            }
        }
        for (verb, weight) in self.random_verbs.iter().zip(&self.random_weights) {
            if self.build_inputs(verb).is_empty() {
                return Err(fail(format!("random verb '{verb}' does not translate")));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(fail(format!(
                    "random verb '{verb}' has invalid weight {weight}"
                )));
            }
        }
        if !self.random_weights.is_empty() && self.random_weights.iter().sum::<f64>() <= 0.0 {
            return Err(fail("random verb weights sum to zero".to_string()));
        }
        Ok(())
    }

    /// True iff the message text starts with this actionset's prefix.
    pub fn message_is_command(&self, msg: &ChatMessage) -> bool {
        msg.text.starts_with(&self.action_prefix)
    }

    /// Translate one chat message into an input action.
    ///
    /// Returns `None` for non-commands and for commands where no term
    /// resolved to a sub-action, so callers can treat the message as
    /// "no action".
    pub fn translate_user_message_to_action(&self, msg: &ChatMessage) -> Option<InputAction> {
        if !self.message_is_command(msg) {
            return None;
        }
        let presses = self.build_inputs(&msg.text.to_lowercase());
        if presses.is_empty() {
            return None;
        }
        Some(InputAction {
            player_index: self.player_index,
            presses,
        })
    }

    /// Whether the idle random fallback is usable at all.
    pub fn has_random_actions(&self) -> bool {
        !self.random_verbs.is_empty()
    }

    /// Weighted-random pick from the configured idle verbs.
    ///
    /// Validation guarantees every configured verb translates, so a
    /// failure here is a programming error and fails loudly.
    pub fn random_action(&self) -> InputAction {
        let dist = WeightedIndex::new(&self.random_weights)
            .unwrap_or_else(|e| panic!("actionset {}: bad random weights: {e}", self.name));
        let verb = &self.random_verbs[dist.sample(&mut thread_rng())];
        let presses = self.build_inputs(verb);
        if presses.is_empty() {
            panic!("actionset {}: random verb '{verb}' failed to translate", self.name);
        }
        InputAction {
            player_index: self.player_index,
            presses,
        }
    }

    /// Resolve action text into concrete key inputs.
    ///
    /// Unknown verbs are skipped, never abort the rest of the message.
    fn build_inputs(&self, text: &str) -> Vec<KeyInput> {
        let mut inputs = Vec::new();
        for parsed in parse_action_text(text) {
            let Some(params) = self.lookup_verb(&parsed.verb) else {
                continue;
            };
            self.append_verb_inputs(&parsed, &params, &mut inputs);
        }
        inputs
    }

    fn lookup_verb(&self, verb: &str) -> Option<Vec<VerbParams>> {
        self.verbs
            .get(verb)
            .cloned()
            .or_else(|| self.macros.read().get(verb).cloned())
    }

    fn append_verb_inputs(
        &self,
        parsed: &ParsedVerb,
        params: &[VerbParams],
        out: &mut Vec<KeyInput>,
    ) {
        // The first sub-action's default duration is the pivot: an explicit
        // user duration replaces it and shifts every later sub-action by
        // its own default-duration delta, preserving relative timing.
        let pivot = i64::from(params.first().map(|p| p.duration).unwrap_or(0));

        for param in params {
            let Some(key) = self
                .keys
                .get(&param.key)
                .and_then(|keys| keys.get(self.player_index))
            else {
                // Unreachable after validate(); skip rather than crash.
                error!(
                    actionset = %self.name,
                    key = %param.key,
                    "verb table and key map disagree"
                );
                return;
            };

            let min_time = i64::from(param.min_time);
            let max_time = i64::from(param.max_time);
            let delay = clamp(
                0,
                i64::from(parsed.delay) + i64::from(param.delay),
                max_time,
            );

            let event = match param.input_type {
                InputType::Press => {
                    // Delay and duration share max_time so a term can never
                    // occupy more than one clamp window.
                    let duration_ms = if parsed.duration > 0 {
                        let offset = i64::from(param.duration) - pivot;
                        clamp(
                            min_time,
                            i64::from(parsed.duration) + offset,
                            max_time - i64::from(delay),
                        )
                    } else {
                        clamp(
                            min_time,
                            i64::from(param.duration),
                            max_time - i64::from(delay),
                        )
                    };
                    KeyEvent::Press { duration_ms }
                }
                InputType::Hold => KeyEvent::Hold,
                InputType::Release => KeyEvent::Release,
            };

            out.push(KeyInput {
                key: key.clone(),
                delay_ms: delay,
                event,
            });
        }
    }

    // ------------------------------------------------------------------
    // Macro management
    // ------------------------------------------------------------------

    /// Currently stored macros, unprefixed names only.
    pub fn get_macros(&self) -> HashMap<String, Vec<VerbParams>> {
        let macros = self.macros.read();
        macros
            .iter()
            .filter(|(name, _)| !name.starts_with(&self.action_prefix))
            .map(|(name, params)| (name.clone(), params.clone()))
            .collect()
    }

    /// Replace the macro table; every macro is stored in bare and
    /// prefixed form so both resolve during translation.
    pub fn set_macros(&self, new_macros: HashMap<String, Vec<VerbParams>>) {
        let mut table = HashMap::with_capacity(new_macros.len() * 2);
        for (name, params) in new_macros {
            table.insert(format!("{}{name}", self.action_prefix), params.clone());
            table.insert(name, params);
        }
        *self.macros.write() = table;
    }

    /// Compile an action string into a stored macro.
    fn compile_macro(&self, contents: &str) -> Result<Vec<VerbParams>, String> {
        let mut macro_params = Vec::new();
        for parsed in parse_action_text(&contents.to_lowercase()) {
            let Some(params) = self.lookup_verb(&parsed.verb) else {
                return Err(format!("'{}' is not a valid verb/macro", parsed.verb));
            };
            for mut param in params {
                let max_time = i64::from(param.max_time);
                let delay = clamp(0, i64::from(parsed.delay), max_time);
                param.delay = delay;
                if parsed.duration > 0 {
                    param.duration = clamp(
                        i64::from(param.min_time),
                        i64::from(parsed.duration),
                        max_time - i64::from(delay),
                    );
                }
                macro_params.push(param);
            }
        }
        Ok(macro_params)
    }

    /// Add a macro from a `<cmd> <name> <contents>` chat message.
    ///
    /// Returns `false` (no mutation, no file write) when macro changing is
    /// disabled, the command is malformed, the name is invalid or taken,
    /// or the contents don't compile.
    pub fn add_macro(&self, msg: &ChatMessage) -> bool {
        self.store_macro(msg, false)
    }

    /// Replace an existing macro; fails if the name doesn't exist.
    pub fn change_macro(&self, msg: &ChatMessage) -> bool {
        self.store_macro(msg, true)
    }

    fn store_macro(&self, msg: &ChatMessage, must_exist: bool) -> bool {
        if !self.allow_changing_macros {
            return false;
        }
        let (_, rest) = split_first_word(&msg.text);
        let (raw_name, contents) = split_first_word(rest);
        if raw_name.is_empty() || contents.is_empty() {
            warn!(actionset = %self.name, "malformed macro command, need name and contents");
            return false;
        }
        let Some(name) = self.normalize_macro_name(raw_name) else {
            warn!(actionset = %self.name, name = %raw_name, "invalid macro name");
            return false;
        };
        let exists = self.macros.read().contains_key(&name);
        if must_exist && !exists {
            warn!(actionset = %self.name, name = %name, "can't change macro, no such macro");
            return false;
        }
        if !must_exist && exists {
            warn!(actionset = %self.name, name = %name, "can't add macro, name already exists");
            return false;
        }
        let macro_params = match self.compile_macro(contents) {
            Ok(params) if !params.is_empty() => params,
            Ok(_) => {
                warn!(actionset = %self.name, name = %name, "macro compiled to nothing");
                return false;
            }
            Err(reason) => {
                warn!(actionset = %self.name, name = %name, %reason, "macro failed to compile");
                return false;
            }
        };
        {
            let mut macros = self.macros.write();
            macros.insert(format!("{}{name}", self.action_prefix), macro_params.clone());
            macros.insert(name, macro_params);
        }
        self.save_macros_to_file();
        true
    }

    /// Remove a macro named in a `<cmd> <name>` chat message.
    pub fn remove_macro(&self, msg: &ChatMessage) -> bool {
        if !self.allow_changing_macros {
            return false;
        }
        let (_, rest) = split_first_word(&msg.text);
        let (raw_name, _) = split_first_word(rest);
        if raw_name.is_empty() {
            warn!(actionset = %self.name, "malformed macro removal, need a name");
            return false;
        }
        let Some(name) = self.normalize_macro_name(raw_name) else {
            warn!(actionset = %self.name, name = %raw_name, "invalid macro name");
            return false;
        };
        {
            let mut macros = self.macros.write();
            if macros.remove(&name).is_none() {
                warn!(actionset = %self.name, name = %name, "can't remove macro, no such macro");
                return false;
            }
            macros.remove(&format!("{}{name}", self.action_prefix));
        }
        self.save_macros_to_file();
        true
    }

    /// Reload macros from the macro file, discarding local changes.
    pub fn reload_macros(&self) -> bool {
        if self.macro_file.is_none() {
            return false;
        }
        self.load_macros_from_file();
        true
    }

    fn normalize_macro_name(&self, raw: &str) -> Option<String> {
        let name = raw.to_lowercase();
        let name = name.strip_prefix(&self.action_prefix).unwrap_or(&name);
        if MACRO_NAME_REGEX.is_match(name) {
            Some(name.to_string())
        } else {
            None
        }
    }

    fn load_macros_from_file(&self) {
        let Some(path) = &self.macro_file else {
            return;
        };
        match MacroFile::load(path) {
            Ok(file) => {
                log_macro_diff(&self.name, &self.get_macros(), &file.macros);
                self.set_macros(file.macros);
            }
            Err(e) => {
                warn!(actionset = %self.name, path = %path.display(), error = %e, "failed to load macro file");
            }
        }
    }

    fn save_macros_to_file(&self) {
        if !self.persistent_macros {
            return;
        }
        let Some(path) = &self.macro_file else {
            return;
        };
        let mut file = match MacroFile::load(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(actionset = %self.name, path = %path.display(), error = %e, "failed to read macro file before save");
                MacroFile::default()
            }
        };
        let local = self.get_macros();
        log_macro_diff(&self.name, &file.macros, &local);
        file.macros = local;
        if let Err(e) = file.save(path) {
            warn!(actionset = %self.name, path = %path.display(), error = %e, "failed to save macro file");
        }
    }
}

/// Build the full runtime verb table from a definition: aliases share the
/// aliased verb's parameters, every entry gains `hold_`/`release_`
/// variants, and everything is duplicated under the action prefix.
fn expand_verb_table(
    def: &ActionsetDef,
) -> Result<HashMap<String, Vec<VerbParams>>, FatalError> {
    let mut verbs: HashMap<String, Vec<VerbParams>> = def.verbs.iter().cloned().collect();

    for (alias, target) in &def.aliases {
        let Some(params) = verbs.get(target).cloned() else {
            return Err(FatalError::ActionsetValidation {
                actionset: def.name.clone(),
                reason: format!("alias '{alias}' points at unknown verb '{target}'"),
            });
        };
        verbs.insert(alias.clone(), params);
    }

    for (name, params) in verbs.clone() {
        for (modifier, input_type) in [("hold", InputType::Hold), ("release", InputType::Release)]
        {
            let mod_params = params
                .iter()
                .cloned()
                .map(|mut p| {
                    p.input_type = input_type;
                    p
                })
                .collect();
            verbs.insert(format!("{modifier}_{name}"), mod_params);
        }
    }

    for (name, params) in verbs.clone() {
        verbs.insert(format!("{}{name}", def.action_prefix), params);
    }

    Ok(verbs)
}

fn split_first_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim_start()),
        None => (text, ""),
    }
}
