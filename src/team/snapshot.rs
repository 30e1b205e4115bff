//! Whole-session snapshots: members, user lists and macros for every
//! team, serialized as one JSON document.

use crate::actions::VerbParams;
use crate::state::AppState;
use crate::userdata::UserListSnapshot;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// One team's captured state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub members: Vec<String>,
    pub whitelist: UserListSnapshot,
    pub blacklist: UserListSnapshot,
    pub macros: HashMap<String, Vec<VerbParams>>,
}

/// The on-disk document: every team keyed by name, plus a timestamp.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub created: String,
    pub teams: BTreeMap<String, TeamSnapshot>,
}

impl Snapshot {
    pub fn capture(state: &AppState) -> Self {
        let teams = state
            .teams()
            .iter()
            .map(|team| (team.name.clone(), team.create_snapshot()))
            .collect();
        Self {
            created: Utc::now().to_rfc3339(),
            teams,
        }
    }
}

/// Capture all teams and write the snapshot to `dir`. The file name is
/// `name` when given, otherwise derived from the current time.
pub fn save_snapshot(
    state: &AppState,
    dir: &Path,
    name: Option<&str>,
) -> Result<PathBuf, SnapshotError> {
    let snapshot = Snapshot::capture(state);
    let file_name = match name {
        Some(name) => format!("{name}.json"),
        None => format!(
            "snapshot_{}.json",
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        ),
    };
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
    info!(path = %path.display(), teams = snapshot.teams.len(), "snapshot saved");
    Ok(path)
}

/// Load a snapshot file and restore every team it names that still
/// exists. Teams present in the file but absent from the running
/// configuration are skipped with a warning.
pub fn load_snapshot(state: &AppState, path: &Path) -> Result<(), SnapshotError> {
    let raw = fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&raw)?;
    for (name, team_snapshot) in &snapshot.teams {
        match state.team_by_name(name) {
            Some(team) => team.restore_snapshot(team_snapshot),
            None => {
                tracing::warn!(team = %name, "snapshot names a team that is not configured");
            }
        }
    }
    info!(path = %path.display(), "snapshot restored");
    Ok(())
}
