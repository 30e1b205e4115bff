//! Membership strategies.
//!
//! Each configured rule contributes an optional vote to the inclusion
//! fold and may additionally hard-block (and evict) a user. Rules are
//! composed as an ordered list on the team, evaluated until a voter is
//! certain.

use crate::chat::ChatMessage;
use crate::error::FatalError;
use crate::quadstate::Quadstate;
use crate::state::AppState;
use crate::team::Team;
use regex::Regex;
use std::sync::LazyLock;

/// Matches a prediction badge and captures the bet number,
/// e.g. `predictions/pink-2` or `predictions/blue-1`.
static PREDICTION_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"predictions/[a-z]+-([0-9]+)").unwrap());

/// Which side of a channel prediction a team recruits from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionSide {
    Blue,
    Pink,
    /// Users who have not placed a bet.
    NoBet,
    /// A specific numbered outcome (multi-outcome predictions).
    Number(u8),
}

/// One membership strategy.
#[derive(Debug, Clone)]
pub enum TeamRule {
    /// Accept anyone not otherwise excluded.
    Everyone,
    /// Accept users whose full name matches the pattern, certainly
    /// reject everyone else.
    NamePattern(Regex),
    /// Defer to smaller visible teams: reject while any other balancing
    /// team has fewer members.
    Balancing,
    /// Only members and whitelisted users get in; blocks the rest.
    WhitelistOnly,
    /// Nobody gets in and the team's loops stay idle.
    Nobody,
    /// No chat members; idle random actions fire whenever input is
    /// accepted.
    RandomOnly,
    /// Recruit from one side of a channel prediction; the opposing side
    /// is blocked and evicted.
    Prediction(PredictionSide),
}

impl TeamRule {
    /// Build a rule from its configuration name. `pattern` feeds
    /// `name_pattern`, `number` feeds `prediction_number`.
    pub fn from_config(
        kind: &str,
        team: &str,
        pattern: Option<&str>,
        number: Option<u8>,
    ) -> Result<Self, FatalError> {
        match kind {
            "everyone" => Ok(Self::Everyone),
            "name_pattern" => {
                let pattern = pattern.ok_or_else(|| FatalError::TeamCreation {
                    team: team.to_string(),
                    reason: "name_pattern rule requires a pattern".to_string(),
                })?;
                // Anchored: the whole username must match.
                let anchored = format!("^(?:{pattern})$");
                let regex = Regex::new(&anchored).map_err(|e| FatalError::TeamCreation {
                    team: team.to_string(),
                    reason: format!("invalid name pattern {pattern:?}: {e}"),
                })?;
                Ok(Self::NamePattern(regex))
            }
            "balancing" => Ok(Self::Balancing),
            "whitelist_only" => Ok(Self::WhitelistOnly),
            "nobody" => Ok(Self::Nobody),
            "random_only" => Ok(Self::RandomOnly),
            "prediction_blue" => Ok(Self::Prediction(PredictionSide::Blue)),
            "prediction_pink" => Ok(Self::Prediction(PredictionSide::Pink)),
            "prediction_none" => Ok(Self::Prediction(PredictionSide::NoBet)),
            "prediction_number" => {
                let number = number.ok_or_else(|| FatalError::TeamCreation {
                    team: team.to_string(),
                    reason: "prediction_number rule requires a number".to_string(),
                })?;
                Ok(Self::Prediction(PredictionSide::Number(number)))
            }
            other => Err(FatalError::TeamCreation {
                team: team.to_string(),
                reason: format!("unknown team rule {other:?}"),
            }),
        }
    }

    /// This rule's inclusion vote, or `None` to abstain.
    pub fn vote(&self, team: &Team, state: &AppState, msg: &ChatMessage) -> Option<Quadstate> {
        match self {
            Self::Everyone => Some(Quadstate::MaybeTrue),
            Self::NamePattern(regex) => {
                if regex.is_match(&msg.user) {
                    Some(Quadstate::MaybeTrue)
                } else {
                    Some(Quadstate::AbsolutelyFalse)
                }
            }
            Self::Balancing => {
                let own_count = team.member_count();
                let smaller_peer_exists = state
                    .teams()
                    .iter()
                    .filter(|peer| peer.key() != team.key())
                    .filter(|peer| peer.has_balancing_rule() && !peer.hidden)
                    .any(|peer| peer.member_count() < own_count);
                if smaller_peer_exists {
                    Some(Quadstate::AbsolutelyFalse)
                } else {
                    Some(Quadstate::MaybeTrue)
                }
            }
            Self::WhitelistOnly => None,
            Self::Nobody => Some(Quadstate::AbsolutelyFalse),
            Self::RandomOnly => Some(Quadstate::AbsolutelyFalse),
            Self::Prediction(side) => side.vote(msg),
        }
    }

    /// Whether this rule hard-blocks the message. A block from a
    /// prediction rule also evicts the user, since their badge proves
    /// they belong to the opposing side.
    pub fn blocks(&self, team: &Team, state: &AppState, msg: &ChatMessage) -> bool {
        match self {
            Self::WhitelistOnly => {
                !(team.is_member(&msg.user) || team.whitelist.lock().message_in_list(msg))
            }
            Self::Prediction(side) => {
                if side.opposes(msg) {
                    team.evict(state, &msg.user);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

impl PredictionSide {
    /// Inclusion vote based on the prediction badge. A matching badge is
    /// a leaning yes so later rules in the chain can still veto; anything
    /// else (including no badges at all) is a certain no.
    fn vote(&self, msg: &ChatMessage) -> Option<Quadstate> {
        let badges = msg.badges();
        let verdict = match self {
            Self::Blue => badges.contains("predictions/blue"),
            Self::Pink => badges.contains("predictions/pink"),
            Self::NoBet => !badges.contains("predictions/"),
            Self::Number(n) => prediction_number(badges) == Some(*n),
        };
        if verdict {
            Some(Quadstate::MaybeTrue)
        } else {
            Some(Quadstate::AbsolutelyFalse)
        }
    }

    /// Whether the badge proves membership of the opposing side.
    fn opposes(&self, msg: &ChatMessage) -> bool {
        let badges = msg.badges();
        match self {
            Self::Blue => badges.contains("predictions/pink"),
            Self::Pink => badges.contains("predictions/blue"),
            Self::NoBet => badges.contains("predictions/"),
            Self::Number(n) => {
                prediction_number(badges).is_some_and(|found| found != *n)
            }
        }
    }
}

fn prediction_number(badges: &str) -> Option<u8> {
    PREDICTION_NUMBER_REGEX
        .captures(badges)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Actionset, ActionsetDef, VerbParams};
    use crate::chat::MessageKind;
    use crate::input::LocalInputServer;
    use crate::team::TeamDef;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn actionset() -> Actionset {
        let def = ActionsetDef {
            name: "test".into(),
            verbs: vec![("left".into(), vec![VerbParams::press("left", 150)])],
            keys: HashMap::from([("left".into(), vec!["left".into()])]),
            ..Default::default()
        };
        Actionset::new(def, Arc::new(LocalInputServer::new())).unwrap()
    }

    fn team_with_rules(name: &str, rules: Vec<TeamRule>) -> Arc<Team> {
        let def = TeamDef {
            name: name.into(),
            channels: HashSet::from(["#chan".to_string()]),
            rules,
            ..Default::default()
        };
        Team::new(def, actionset()).unwrap()
    }

    fn msg_with_badges(user: &str, badges: Option<&str>) -> ChatMessage {
        let mut tags = HashMap::new();
        if let Some(badges) = badges {
            tags.insert("badges".to_string(), badges.to_string());
        }
        ChatMessage::new(MessageKind::Privmsg, user, "#chan", "+left", tags)
    }

    #[test]
    fn test_from_config_rejects_unknown_kind() {
        assert!(matches!(
            TeamRule::from_config("psychic", "Red", None, None),
            Err(FatalError::TeamCreation { .. })
        ));
    }

    #[test]
    fn test_name_pattern_requires_full_match() {
        let rule = TeamRule::from_config("name_pattern", "Red", Some("[a-m].*"), None).unwrap();
        let team = team_with_rules("Red", vec![rule.clone()]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        let vote = |user: &str| rule.vote(&team, &state, &msg_with_badges(user, None));
        assert_eq!(vote("alice"), Some(Quadstate::MaybeTrue));
        assert_eq!(vote("zed"), Some(Quadstate::AbsolutelyFalse));
    }

    #[test]
    fn test_balancing_rejects_while_peer_is_smaller() {
        let red = team_with_rules("Red", vec![TeamRule::Balancing]);
        let blue = team_with_rules("Blue", vec![TeamRule::Balancing]);
        let state =
            AppState::for_teams(vec![Arc::clone(&red), Arc::clone(&blue)]).unwrap();

        // Equal counts: red accepts.
        let probe = msg_with_badges("user1", None);
        assert!(red.belongs_to_team(&state, &probe));
        red.add_message(&state, probe);

        // Red now has one member, blue zero: red defers.
        assert!(!red.belongs_to_team(&state, &msg_with_badges("user2", None)));
        assert!(blue.belongs_to_team(&state, &msg_with_badges("user2", None)));
    }

    #[test]
    fn test_whitelist_only_blocks_outsiders() {
        let team = team_with_rules("Red", vec![TeamRule::WhitelistOnly, TeamRule::Everyone]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();
        team.whitelist.lock().add_to_list("vip", &team.channels);

        assert!(!team.blocked_from_team(&state, &msg_with_badges("vip", None)));
        assert!(team.blocked_from_team(&state, &msg_with_badges("pleb", None)));
    }

    #[test]
    fn test_prediction_side_votes() {
        let rule = TeamRule::Prediction(PredictionSide::Blue);
        let team = team_with_rules("Blue", vec![rule.clone()]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        let blue = msg_with_badges("b", Some("predictions/blue-1,subscriber/3"));
        let pink = msg_with_badges("p", Some("predictions/pink-2"));
        let untagged = msg_with_badges("u", None);

        // A match only leans yes: later rules must keep their veto.
        assert_eq!(rule.vote(&team, &state, &blue), Some(Quadstate::MaybeTrue));
        assert_eq!(rule.vote(&team, &state, &pink), Some(Quadstate::AbsolutelyFalse));
        assert_eq!(rule.vote(&team, &state, &untagged), Some(Quadstate::AbsolutelyFalse));
    }

    #[test]
    fn test_prediction_combined_with_name_pattern_keeps_the_veto() {
        let name_rule =
            TeamRule::from_config("name_pattern", "Blue", Some("[a-m].*"), None).unwrap();
        let team = team_with_rules(
            "Blue",
            vec![TeamRule::Prediction(PredictionSide::Blue), name_rule],
        );
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        let matching = msg_with_badges("alice", Some("predictions/blue-1"));
        let wrong_name = msg_with_badges("zed", Some("predictions/blue-1"));
        assert!(team.belongs_to_team(&state, &matching));
        assert!(!team.belongs_to_team(&state, &wrong_name));
    }

    #[test]
    fn test_prediction_team_rejects_untagged_users() {
        let team = team_with_rules(
            "Blue",
            vec![TeamRule::Prediction(PredictionSide::Blue), TeamRule::Everyone],
        );
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        assert!(!team.belongs_to_team(&state, &msg_with_badges("nobadges", None)));
        assert!(team.belongs_to_team(
            &state,
            &msg_with_badges("bettor", Some("predictions/blue-1"))
        ));
    }

    #[test]
    fn test_prediction_block_evicts_opposing_bettor() {
        let team = team_with_rules(
            "Blue",
            vec![TeamRule::Prediction(PredictionSide::Blue), TeamRule::Everyone],
        );
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        // Joins before betting, then shows up with a pink badge.
        team.add_message(&state, msg_with_badges("turncoat", None));
        assert!(team.is_member("turncoat"));
        let pink = msg_with_badges("turncoat", Some("predictions/pink-2"));
        assert!(team.blocked_from_team(&state, &pink));
        assert!(!team.is_member("turncoat"));
    }

    #[test]
    fn test_prediction_number_matches_outcome() {
        let rule = TeamRule::Prediction(PredictionSide::Number(3));
        let team = team_with_rules("Three", vec![rule.clone()]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        let three = msg_with_badges("a", Some("predictions/gray-3"));
        let five = msg_with_badges("b", Some("predictions/gray-5"));
        assert_eq!(rule.vote(&team, &state, &three), Some(Quadstate::MaybeTrue));
        assert_eq!(rule.vote(&team, &state, &five), Some(Quadstate::AbsolutelyFalse));
        assert!(rule.blocks(&team, &state, &five));
        assert!(!rule.blocks(&team, &state, &three));
    }

    #[test]
    fn test_no_bet_side() {
        let rule = TeamRule::Prediction(PredictionSide::NoBet);
        let team = team_with_rules("Neutral", vec![rule.clone()]);
        let state = AppState::for_teams(vec![Arc::clone(&team)]).unwrap();

        let bettor = msg_with_badges("a", Some("predictions/blue-1"));
        let abstainer = msg_with_badges("b", Some("subscriber/6"));
        assert_eq!(rule.vote(&team, &state, &bettor), Some(Quadstate::AbsolutelyFalse));
        assert_eq!(
            rule.vote(&team, &state, &abstainer),
            Some(Quadstate::MaybeTrue)
        );
    }
}
