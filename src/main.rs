//! Caatuu · Challenge Engine service
//!
//! - Axum HTTP + WebSocket API over the challenge engine
//! - Sandbox runtime warmed up in the background at startup
//! - Idle sessions swept on an interval
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   ENGINE_CONFIG_PATH : path to TOML config (sandbox limits, sessions, challenge bank)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use caatuu_engine::logic;
use caatuu_engine::routes::build_router;
use caatuu_engine::state::AppState;
use caatuu_engine::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());

  // Load the sandbox now so the first submission doesn't pay for it.
  logic::warm_up(&state);
  let sweeper = state.spawn_session_sweeper();

  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "caatuu_engine", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        error!(target: "caatuu_engine", error = %e, "Failed to listen for shutdown signal");
      }
      info!(target: "caatuu_engine", "Shutdown requested");
    })
    .await?;
  sweeper.abort();
  Ok(())
}
