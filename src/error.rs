//! Unified error handling.
//!
//! Only misconfiguration is allowed to halt the process: every condition a
//! chat user can trigger through message content is absorbed where it
//! happens (dropped message, `false` return), never raised. Startup errors
//! carry distinct process exit codes so supervisors can tell failure kinds
//! apart.

use thiserror::Error;

/// Configuration-fatal startup errors. Raised once, never retried.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("duplicate team name: {0}")]
    DuplicateTeamName(String),

    #[error("invalid configuration for team '{team}': {reason}")]
    TeamCreation { team: String, reason: String },

    #[error("actionset '{actionset}' failed validation: {reason}")]
    ActionsetValidation { actionset: String, reason: String },
}

impl FatalError {
    /// Process exit code, distinct per failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::DuplicateTeamName(_) => 3,
            Self::TeamCreation { .. } => 4,
            Self::ActionsetValidation { .. } => 5,
        }
    }
}
