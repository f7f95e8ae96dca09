//! Assessment backend
//!
//! - Axum HTTP + WebSocket API for rendering and scoring questions
//! - Session state lives entirely in request/response bodies
//! - Optional remote question-set store (via environment variables)
//! - Static review UI fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   QSET_STORE_URL    : enables the remote question-set store if present
//!   QSET_STORE_TOKEN  : bearer token for the remote store
//!   BANK_CONFIG_PATH  : path to TOML config (question bank + file options)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use assess_backend::routes::build_router;
use assess_backend::state::AppState;
use assess_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (question bank, engines, remote store).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "assess_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
