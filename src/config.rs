//! Configuration loader for the `healthpulse-backend` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::llm::{CompletionPolicy, DEFAULT_GEMINI_MODEL};

/// Longest history look-back a client or `HISTORY_DAYS` may ask for.
pub const MAX_HISTORY_DAYS: u32 = 3_650;

/// Longest idle TTL accepted for active sessions (ten years).
pub const MAX_SESSION_TTL_HOURS: u32 = 87_600;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable, treating blank as unset.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite connection string for the long-term memory bank.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Completion service API key; `None` disables every AI path.
    pub gemini_api_key: Option<String>,

    /// Completion model name.
    pub gemini_model: String,

    /// Per-attempt completion timeout, in seconds.
    pub llm_timeout_secs: u32,

    /// Retries after the first completion attempt.
    pub llm_max_retries: u32,

    /// Initial backoff between completion attempts, in milliseconds.
    pub llm_retry_backoff_ms: u32,

    /// Idle time after which active sessions are evicted.
    pub session_ttl_hours: u32,

    /// Period of the background expiry sweep, in seconds.
    pub session_sweep_secs: u32,

    /// Default look-back for history queries.
    pub history_days: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – SQLite connection string (default: `sqlite:health_memory.db`)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `GEMINI_API_KEY` – completion service key (default: unset, AI disabled)
/// - `GEMINI_MODEL` – model name (default: `gemini-2.5-flash`)
/// - `LLM_TIMEOUT_SECS` – per-attempt timeout (default: 20)
/// - `LLM_MAX_RETRIES` – retries after the first attempt (default: 1)
/// - `LLM_RETRY_BACKOFF_MS` – initial retry backoff (default: 500)
/// - `SESSION_TTL_HOURS` – active session TTL, 1..=87600 (default: 24)
/// - `SESSION_SWEEP_SECS` – expiry sweep period (default: 300)
/// - `HISTORY_DAYS` – history look-back, 1..=3650 (default: 30)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = optional_env!("DATABASE_URL").unwrap_or_else(|| "sqlite:health_memory.db".to_string());
    let bind_addr = optional_env!("BIND_ADDR")
        .unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;
    let gemini_api_key = optional_env!("GEMINI_API_KEY");
    let gemini_model = optional_env!("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let llm_timeout_secs = parse_env_u32!("LLM_TIMEOUT_SECS", 20);
    let llm_max_retries = parse_env_u32!("LLM_MAX_RETRIES", 1);
    let llm_retry_backoff_ms = parse_env_u32!("LLM_RETRY_BACKOFF_MS", 500);
    let session_ttl_hours = parse_env_u32!("SESSION_TTL_HOURS", 24);
    let session_sweep_secs = parse_env_u32!("SESSION_SWEEP_SECS", 300);
    let history_days = parse_env_u32!("HISTORY_DAYS", 30);

    let llm_timeout_secs = check_range("LLM_TIMEOUT_SECS", llm_timeout_secs, 1..=u32::MAX)?;
    let session_sweep_secs = check_range("SESSION_SWEEP_SECS", session_sweep_secs, 1..=u32::MAX)?;
    let session_ttl_hours = check_range("SESSION_TTL_HOURS", session_ttl_hours, 1..=MAX_SESSION_TTL_HOURS)?;
    let history_days = check_range("HISTORY_DAYS", history_days, 1..=MAX_HISTORY_DAYS)?;

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        gemini_api_key,
        gemini_model,
        llm_timeout_secs,
        llm_max_retries,
        llm_retry_backoff_ms,
        session_ttl_hours,
        session_sweep_secs,
        history_days,
    })
}

fn check_range(name: &str, value: u32, range: RangeInclusive<u32>) -> Result<u32> {
    // ---
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(anyhow!(
            "Invalid {}: {} is outside {}..={}",
            name,
            value,
            range.start(),
            range.end()
        ))
    }
}

/// Show only the last four characters of a secret.
fn mask_key(key: &str) -> String {
    // ---
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("****{tail}")
}

impl Config {
    // ---
    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy {
            timeout: Duration::from_secs(self.llm_timeout_secs.into()),
            max_retries: self.llm_max_retries,
            backoff: Duration::from_millis(self.llm_retry_backoff_ms.into()),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours.into())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs.into())
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the API key while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_key = match &self.gemini_api_key {
            Some(key) => mask_key(key),
            None => "(unset, AI features use fallbacks)".to_string(),
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL         : {}", self.db_url);
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR            : {}", self.bind_addr);
        tracing::info!("  GEMINI_API_KEY       : {}", masked_key);
        tracing::info!("  GEMINI_MODEL         : {}", self.gemini_model);
        tracing::info!("  LLM_TIMEOUT_SECS     : {}", self.llm_timeout_secs);
        tracing::info!("  LLM_MAX_RETRIES      : {}", self.llm_max_retries);
        tracing::info!("  LLM_RETRY_BACKOFF_MS : {}", self.llm_retry_backoff_ms);
        tracing::info!("  SESSION_TTL_HOURS    : {}", self.session_ttl_hours);
        tracing::info!("  SESSION_SWEEP_SECS   : {}", self.session_sweep_secs);
        tracing::info!("  HISTORY_DAYS         : {}", self.history_days);
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        // ---
        Self {
            db_url: "sqlite::memory:".to_string(),
            db_pool_max: 1,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            llm_timeout_secs: 1,
            llm_max_retries: 0,
            llm_retry_backoff_ms: 1,
            session_ttl_hours: 24,
            session_sweep_secs: 300,
            history_days: 30,
        }
    }
}
