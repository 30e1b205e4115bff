//! Verb parameter tables and the chat verb grammar.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Grammar for one action term: `<verb>[ [<delay>]<sep>][<duration>]`,
/// separator one of `+ , ; :` or `->`, repeated across the message.
static VERB_DELAY_DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\S+)(?:\s+(?:(\d+)?\s*(?:[+,;:]|->)\s*)?(\d+)?(?:$|\s))?")
        .expect("verb grammar regex is valid")
});

/// How a verb's key event is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Press,
    Hold,
    Release,
}

/// Timing parameters for one sub-action of a verb.
///
/// All times in milliseconds. `min_time`/`max_time` are the clamp bounds
/// applied to user-supplied values (troll prevention); they are fixed per
/// verb and validated at actionset construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbParams {
    pub key: String,
    #[serde(default)]
    pub delay: u32,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_min_time")]
    pub min_time: u32,
    #[serde(default = "default_max_time")]
    pub max_time: u32,
    #[serde(default)]
    pub input_type: InputType,
}

fn default_duration() -> u32 {
    50
}

fn default_min_time() -> u32 {
    1
}

fn default_max_time() -> u32 {
    1000
}

impl VerbParams {
    pub fn press(key: &str, duration: u32) -> Self {
        Self {
            key: key.to_string(),
            delay: 0,
            duration,
            min_time: default_min_time(),
            max_time: default_max_time(),
            input_type: InputType::Press,
        }
    }
}

/// One term extracted from a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerb {
    pub verb: String,
    /// User-supplied delay, 0 if absent.
    pub delay: u32,
    /// User-supplied duration, 0 if absent.
    pub duration: u32,
}

/// Extract all verb terms from (already lowercased) action text.
///
/// Out-of-range numbers saturate instead of failing the whole term.
pub fn parse_action_text(text: &str) -> Vec<ParsedVerb> {
    VERB_DELAY_DURATION_REGEX
        .captures_iter(text)
        .map(|caps| ParsedVerb {
            verb: caps[1].to_string(),
            delay: caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(u32::MAX))
                .unwrap_or(0),
            duration: caps
                .get(3)
                .map(|m| m.as_str().parse().unwrap_or(u32::MAX))
                .unwrap_or(0),
        })
        .collect()
}

/// Clamp `value` into `[lower, upper]`, lower bound winning when the
/// interval is empty.
pub(crate) fn clamp(lower: i64, value: i64, upper: i64) -> u32 {
    value.min(upper).max(lower).try_into().unwrap_or(0)
}
