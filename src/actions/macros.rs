//! Macro file persistence.
//!
//! Macros are user-defined verb sequences stored per actionset in a JSON
//! file so they survive restarts.

use crate::actions::VerbParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// On-disk macro file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub macros: HashMap<String, Vec<VerbParams>>,
}

#[derive(Debug, Error)]
pub enum MacroFileError {
    #[error("failed to read macro file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse macro file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl MacroFile {
    /// Read a macro file; a missing file is an empty macro set, not an
    /// error (the file is created on first save).
    pub fn load(path: &Path) -> Result<Self, MacroFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MacroFileError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Log which macro names an update adds, removes or changes.
pub(crate) fn log_macro_diff(
    actionset: &str,
    older: &HashMap<String, Vec<VerbParams>>,
    newer: &HashMap<String, Vec<VerbParams>>,
) {
    let removed: Vec<&str> = older
        .keys()
        .filter(|name| !newer.contains_key(*name))
        .map(String::as_str)
        .collect();
    let added: Vec<&str> = newer
        .keys()
        .filter(|name| !older.contains_key(*name))
        .map(String::as_str)
        .collect();
    let changed: Vec<&str> = newer
        .iter()
        .filter(|(name, params)| older.get(*name).is_some_and(|old| old != *params))
        .map(|(name, _)| name.as_str())
        .collect();

    if !removed.is_empty() {
        info!(actionset, macros = ?removed, "removing macros");
    }
    if !added.is_empty() {
        info!(actionset, macros = ?added, "adding macros");
    }
    if !changed.is_empty() {
        info!(actionset, macros = ?changed, "changing macros");
    }
}
