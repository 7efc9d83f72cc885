//! Kanban Playground - replays a scripted session against the kanban engine.
//!
//! Loads a board fixture, wires it to an in-memory gateway, runs every step of
//! a session script and prints the resulting board. Notifications go to the
//! log.

mod config;
mod error;
mod script;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::script::Session;
use kanban_engine::{Board, BoardState, InMemoryGateway, TracingSurface};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kanban_engine=debug,kanban_playground=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        board = %config.board_path.display(),
        script = %config.script_path.display(),
        undo_ttl_ms = config.engine.undo_ttl.as_millis() as u64,
        "Starting playground"
    );

    let state = BoardState::from_json(&read(&config.board_path)?)?;
    let steps = script::parse(&read(&config.script_path)?)?;

    // The gateway starts out agreeing with the view
    let mut gateway = InMemoryGateway::new(state.clone());
    if let Some(latency) = config.latency {
        gateway = gateway.with_latency(latency);
    }
    let gateway = Arc::new(gateway);

    let board = Board::new(
        state,
        gateway.clone(),
        Arc::new(TracingSurface),
        config.engine.clone(),
    );
    let mut session = Session::new(board, gateway);

    let summary = session.run(&steps).await?;
    tracing::info!(?summary, "Session finished");

    let abandoned = session.board().shutdown();
    if abandoned > 0 {
        tracing::warn!(abandoned, "Pending deletions abandoned at exit");
    }

    println!("{}", session.board().snapshot().to_json_pretty()?);

    Ok(())
}
