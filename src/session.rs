//! Session logging boundary.
//!
//! The real implementation persists a per-session record of routed and
//! executed messages; the core only calls through this trait.

use crate::chat::ChatMessage;

/// Hooks the pipeline fires as messages move through it.
pub trait SessionLog: Send + Sync {
    /// A message was accepted into a team's message queue.
    fn log_action_message(&self, msg: &ChatMessage, team: &str);

    /// A translated action for this message was handed to the input server.
    fn log_executed_message(&self, msg: &ChatMessage, team: &str);
}

/// Session log that records nothing.
#[derive(Debug, Default)]
pub struct NoOpSessionLog;

impl SessionLog for NoOpSessionLog {
    fn log_action_message(&self, _msg: &ChatMessage, _team: &str) {}

    fn log_executed_message(&self, _msg: &ChatMessage, _team: &str) {}
}
