//! AI Football Match Server
//!
//! Accepts AI clients over TCP, pairs them into matches, and writes each
//! finished match to `RESULTS_DIR` as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ai_football::network::{
    AuthConfig, Authenticator, GameServer, JwtAuthenticator, MatchOutcome, ServerConfig, StaticKeyAuthenticator,
};
use ai_football::{NUMBER_OF_STEPS, STEP_INTERVAL_MS, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("AI Football Server v{}", VERSION);
    info!(
        "Match length: {} steps ({} ms each)",
        NUMBER_OF_STEPS, STEP_INTERVAL_MS
    );

    let config = ServerConfig::from_env().context("reading configuration")?;
    tokio::fs::create_dir_all(&config.results_dir)
        .await
        .with_context(|| format!("creating {}", config.results_dir.display()))?;

    let authenticator = select_authenticator();

    let (outcome_tx, outcome_rx) = mpsc::channel(32);
    let writer = tokio::spawn(write_outcomes(outcome_rx, config.results_dir.clone()));

    let server = GameServer::new(config, authenticator, Some(outcome_tx));
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = shutdown.send(());
        }
    });

    server.run().await.context("running server")?;

    // Matches still in flight end once their sockets are gone; the writer
    // finishes when the last sender is dropped.
    drop(server);
    let _ = writer.await;
    info!("Server stopped");
    Ok(())
}

fn select_authenticator() -> Arc<dyn Authenticator> {
    let jwt = AuthConfig::from_env();
    if jwt.is_configured() {
        info!("Using JWT access keys");
        return Arc::new(JwtAuthenticator::new(jwt));
    }

    let table = StaticKeyAuthenticator::from_env();
    if table.is_empty() {
        warn!("No ACCESS_KEYS or AUTH_* configured; every login will be rejected");
    } else {
        info!(players = table.len(), "Using static access keys");
    }
    Arc::new(table)
}

async fn write_outcomes(mut outcomes: mpsc::Receiver<MatchOutcome>, dir: PathBuf) {
    while let Some(outcome) = outcomes.recv().await {
        let (a, b) = outcome.info.score();
        info!(
            match_id = %outcome.match_id,
            "{} {}:{} {}",
            outcome.team_a, a, b, outcome.team_b
        );
        if let Err(e) = write_outcome(&dir, &outcome).await {
            error!(match_id = %outcome.match_id, "Failed to store result: {:#}", e);
        }
    }
}

async fn write_outcome(dir: &Path, outcome: &MatchOutcome) -> anyhow::Result<()> {
    let path = dir.join(format!("{}.json", outcome.match_id));
    let json = serde_json::to_vec_pretty(outcome)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
