//! crowdpilot - crowd-sourced chat-to-input routing
//!
//! Routes chat messages from live text channels into per-team timed
//! input-action queues driving emulated keyboard/gamepad input, under
//! membership rules, spam limits and a most-recent-wins ordering
//! discipline. The chat transport, concrete OS input injection and any
//! UI live outside this crate and talk to it through the
//! [`chat::MessageSender`] and [`input::InputServer`] traits.

pub mod actions;
pub mod chat;
pub mod config;
pub mod error;
pub mod input;
pub mod quadstate;
pub mod session;
pub mod state;
pub mod team;
pub mod userdata;
