//! Message routing: one chat message in, at most one team queue out.

use crate::chat::ChatMessage;
use crate::state::AppState;
use crate::team::Team;
use std::sync::Arc;
use tracing::trace;

/// Route a chat message to the first team that will take it.
///
/// Known users go straight to their owning team; everyone else is offered
/// to the teams in registration order. A message failing the global
/// accept-input toggle or the action-prefix pre-filter is dropped without
/// touching any team.
pub fn route_message(state: &AppState, msg: &ChatMessage) {
    if !state.toggles.accept_input() || !state.message_is_action(msg) {
        return;
    }

    if let Some(owner) = state.users.team_of(&msg.user) {
        if let Some(team) = state.team_by_name(&owner) {
            if try_add_to_team(state, team, msg) {
                return;
            }
        }
    }

    for team in state.teams() {
        if try_add_to_team(state, team, msg) {
            return;
        }
    }
    trace!(user = %msg.user, text = %msg.text, "no team accepted message");
}

/// Full admission check for one team: channel, command syntax, exclusion
/// gate, inclusion gate. Enqueues on success.
fn try_add_to_team(state: &AppState, team: &Arc<Team>, msg: &ChatMessage) -> bool {
    if !team.channels.contains(&msg.channel) {
        return false;
    }
    if !team.actionset.message_is_command(msg) {
        return false;
    }
    if team.blocked_from_team(state, msg) {
        return false;
    }
    if !team.belongs_to_team(state, msg) {
        return false;
    }
    state.session.log_action_message(msg, &team.name);
    team.add_message(state, msg.clone());
    true
}
