//! Input-injection boundary.
//!
//! Teams hand fully-resolved [`Action`] values to an [`InputServer`]; what
//! happens behind that trait (OS key injection, virtual gamepads, a remote
//! input host) is outside this crate. The bundled [`LocalInputServer`] only
//! reproduces the timing behavior and logs what it would press.

mod local;

pub use local::LocalInputServer;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// How a single key event behaves once delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// Press and release after `duration_ms`.
    Press { duration_ms: u32 },
    /// Press and keep held until a matching `Release`.
    Hold,
    /// Release a previously held key.
    Release,
}

/// One timed key instruction, resolved to a concrete device key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    pub key: String,
    /// Milliseconds from action start until the event fires.
    pub delay_ms: u32,
    pub event: KeyEvent,
}

impl KeyInput {
    /// Milliseconds from action start until this input is finished.
    pub fn end_ms(&self) -> u32 {
        match self.event {
            KeyEvent::Press { duration_ms } => self.delay_ms + duration_ms,
            KeyEvent::Hold | KeyEvent::Release => self.delay_ms,
        }
    }
}

/// A batch of key inputs executed as one action for one player slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAction {
    pub player_index: usize,
    pub presses: Vec<KeyInput>,
}

impl InputAction {
    /// Total wall-clock time the action occupies.
    pub fn total_duration(&self) -> Duration {
        let end = self.presses.iter().map(KeyInput::end_ms).max().unwrap_or(0);
        Duration::from_millis(u64::from(end))
    }
}

/// What the execute loop hands to the input server.
///
/// The sleep variant is the "nothing to do" filler so the execute loop has
/// a single synchronous call site regardless of queue state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Input(InputAction),
    Sleep(Duration),
}

/// Input delivery errors.
#[derive(Debug, Error)]
pub enum InputError {
    /// The remote input host refused the connection. Teams treat this as
    /// fail-stop: no further inputs are attempted for that team.
    #[error("input server connection refused")]
    ConnectionRefused,

    #[error("input backend error: {0}")]
    Backend(String),
}

/// Boundary to the concrete input-injection backend.
#[async_trait]
pub trait InputServer: Send + Sync {
    /// Deliver one action. Blocking for the action's full duration is
    /// expected; a slow server degrades only the calling team.
    async fn execute(&self, action: &Action) -> Result<(), InputError>;

    /// Attach a virtual gamepad for a player slot.
    async fn add_gamepad(&self, player_index: usize) -> Result<(), InputError>;

    /// Release a virtual gamepad.
    async fn remove_gamepad(&self, player_index: usize) -> Result<(), InputError>;
}
