//! Local stand-in input server.
//!
//! Reproduces the timing contract of a real injection backend (the call
//! blocks for the action's duration) and traces every key event instead of
//! delivering it to a device driver.

use crate::input::{Action, InputError, InputServer, KeyEvent};
use async_trait::async_trait;
use dashmap::DashSet;
use tracing::{debug, info};

/// Input server that logs instead of injecting.
#[derive(Debug, Default)]
pub struct LocalInputServer {
    gamepads: DashSet<usize>,
}

impl LocalInputServer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InputServer for LocalInputServer {
    async fn execute(&self, action: &Action) -> Result<(), InputError> {
        match action {
            Action::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
            }
            Action::Input(input) => {
                for press in &input.presses {
                    match press.event {
                        KeyEvent::Press { duration_ms } => debug!(
                            player = input.player_index,
                            key = %press.key,
                            delay_ms = press.delay_ms,
                            duration_ms,
                            "press"
                        ),
                        KeyEvent::Hold => debug!(
                            player = input.player_index,
                            key = %press.key,
                            delay_ms = press.delay_ms,
                            "hold"
                        ),
                        KeyEvent::Release => debug!(
                            player = input.player_index,
                            key = %press.key,
                            delay_ms = press.delay_ms,
                            "release"
                        ),
                    }
                }
                tokio::time::sleep(input.total_duration()).await;
            }
        }
        Ok(())
    }

    async fn add_gamepad(&self, player_index: usize) -> Result<(), InputError> {
        if self.gamepads.insert(player_index) {
            info!(player = player_index, "virtual gamepad attached");
        }
        Ok(())
    }

    async fn remove_gamepad(&self, player_index: usize) -> Result<(), InputError> {
        if self.gamepads.remove(&player_index).is_some() {
            info!(player = player_index, "virtual gamepad released");
        }
        Ok(())
    }
}
