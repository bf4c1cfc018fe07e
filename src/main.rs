//! Skill path backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional OpenAI tutor (via environment variables), local tutor otherwise
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : default "gpt-4o"
//!   ENGINE_CONFIG_PATH  : path to TOML config (tutor settings, prompts, paths)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use skillpath_backend::routes::build_router;
use skillpath_backend::state::AppState;
use skillpath_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Catalog, progress ledger, tutor and engine.
  let state = AppState::new().await;

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "skillpath_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
