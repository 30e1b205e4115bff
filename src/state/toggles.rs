//! Externally-owned runtime toggles.
//!
//! The core only reads these; a file- or hotkey-watching collaborator
//! flips them at runtime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Global on/off switches and tunables.
#[derive(Debug, Default)]
pub struct Toggles {
    accept_input: AtomicBool,
    random_action: AtomicBool,
    /// Extra randomized delay budget in milliseconds.
    random_delay_ms: AtomicU64,
}

impl Toggles {
    pub fn new(accept_input: bool, random_action: bool, random_delay: Duration) -> Self {
        Self {
            accept_input: AtomicBool::new(accept_input),
            random_action: AtomicBool::new(random_action),
            random_delay_ms: AtomicU64::new(random_delay.as_millis() as u64),
        }
    }

    pub fn accept_input(&self) -> bool {
        self.accept_input.load(Ordering::Relaxed)
    }

    pub fn set_accept_input(&self, value: bool) {
        self.accept_input.store(value, Ordering::Relaxed);
    }

    pub fn random_action(&self) -> bool {
        self.random_action.load(Ordering::Relaxed)
    }

    pub fn set_random_action(&self, value: bool) {
        self.random_action.store(value, Ordering::Relaxed);
    }

    pub fn random_delay(&self) -> Duration {
        Duration::from_millis(self.random_delay_ms.load(Ordering::Relaxed))
    }

    pub fn set_random_delay(&self, value: Duration) {
        self.random_delay_ms
            .store(value.as_millis() as u64, Ordering::Relaxed);
    }
}
