//! crowdpilot - crowd-sourced chat-to-input routing daemon
//!
//! Routes chat messages into per-team timed input-action queues so a crowd
//! can drive emulated keyboard/gamepad input ("chat plays") in
//! team-vs-team events.

use crowdpilot::chat;
use crowdpilot::config;
use crowdpilot::input::LocalInputServer;
use crowdpilot::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for the team loops before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let input_server = Arc::new(LocalInputServer::new());
    let state = match config::load_state(config_path.as_ref(), input_server) {
        Ok(state) => state,
        Err(e) => {
            error!(path = %config_path, error = %e, "startup failed");
            std::process::exit(e.exit_code());
        }
    };

    for team in state.teams() {
        let player = team.actionset.player_index;
        if state.gamepads.insert(player) {
            if let Err(e) = team.actionset.input_server.add_gamepad(player).await {
                warn!(player, error = %e, "could not attach gamepad");
            }
        }
    }

    info!(
        teams = state.teams().len(),
        config = %config_path,
        "starting crowdpilot"
    );

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for team in state.teams() {
        handles.extend(team.start(Arc::clone(&state)));
        info!(team = %team.name, actionset = %team.actionset.name, "team loops running");
    }

    let console = tokio::spawn(chat::console::run(Arc::clone(&state)));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    console.abort();
    shutdown(&state, handles).await;
    info!("bye");
    Ok(())
}

/// Flip every team's stop flag, then wait for the loops under one shared
/// grace period; stragglers are logged and abandoned.
async fn shutdown(state: &AppState, handles: Vec<JoinHandle<()>>) {
    for team in state.teams() {
        team.stop();
    }
    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("team loops did not stop in time, abandoning them");
    }
}
