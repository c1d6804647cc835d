//! Application entry point for the `healthpulse-backend` service.
//!
//! This binary orchestrates the full startup sequence for the health analysis
//! API, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Opening the SQLite memory bank and creating its schema
//! - Choosing the completion service (Gemini when a key is set)
//! - Starting the background session-expiry sweep
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! See [`config::load_from_env`] for the full list. Logging reads:
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating schema setup to `schema`, configuration parsing to `config`,
//! and route registration to `routes`.
use std::{env, str::FromStr, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::{Context, Result};

mod analysis;
mod config;
mod error;
mod insight;
mod llm;
mod memory;
mod models;
mod navbar;
mod orchestrator;
mod routes;
mod schema;
mod state;

pub use config::Config;
pub use orchestrator::AnalysisReport;
pub use state::AppState;

// Re-exported for routes/*.rs so they depend on this gateway rather than on
// the individual model modules.
pub use models::{Anomaly, HealthRecord, Metric, RawHealthRow, Summary, Trends};

use llm::{CompletionService, GeminiClient, UnavailableCompletion};
use memory::{HealthMemory, MemoryBank, SessionStore};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Opening memory bank: {}", cfg.db_url);

    let options = SqliteConnectOptions::from_str(&cfg.db_url)
        .with_context(|| format!("Invalid DATABASE_URL '{}'", cfg.db_url))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database '{}'", cfg.db_url))?;

    tracing::info!("Successfully opened memory bank");

    schema::create_schema(&pool).await?;

    let llm: Arc<dyn CompletionService> = match &cfg.gemini_api_key {
        Some(key) => Arc::new(GeminiClient::new(key.clone(), cfg.gemini_model.clone())),
        None => {
            tracing::warn!("GEMINI_API_KEY not set, AI features will use fallbacks");
            Arc::new(UnavailableCompletion)
        }
    };

    let sessions = Arc::new(SessionStore::new());
    spawn_session_sweep(Arc::clone(&sessions), &cfg);

    let memory = HealthMemory::new(sessions, MemoryBank::new(pool));
    let addr = cfg.bind_addr;
    let state = AppState::new(cfg, memory, llm);

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Evict idle active sessions every `SESSION_SWEEP_SECS`.
fn spawn_session_sweep(sessions: Arc<SessionStore>, cfg: &Config) {
    // ---
    let ttl = cfg.session_ttl();
    let mut ticker = tokio::time::interval(cfg.sweep_interval());

    tokio::spawn(async move {
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired(ttl).await;
            if removed > 0 {
                tracing::info!(removed, "expired idle sessions");
            }
        }
    });
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level from `RUST_LOG`, else the `AXUM_LOG_LEVEL` env var
///
/// Call once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
