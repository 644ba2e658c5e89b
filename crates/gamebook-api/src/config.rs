//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gamebook_workflow::application::engine::EngineConfig;

use crate::error::AppError;

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// YAML book to serve.
    pub book_path: PathBuf,
    /// PostgreSQL URL; sessions stay in memory when absent.
    pub database_url: Option<String>,
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Per-stage timeout.
    pub stage_timeout: Duration,
    /// Fixed dice seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl AppConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `BOOK_PATH` is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let book_path = lookup("BOOK_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| AppError::Config("BOOK_PATH environment variable must be set".into()))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;

        let stage_timeout = match lookup("STAGE_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().map_err(|e| {
                AppError::Config(format!("STAGE_TIMEOUT_MS must be milliseconds: {e}"))
            })?),
            None => EngineConfig::default().stage_timeout,
        };
        if stage_timeout.is_zero() {
            return Err(AppError::Config("STAGE_TIMEOUT_MS must be positive".into()));
        }

        let rng_seed = lookup("RNG_SEED")
            .map(|seed| {
                seed.parse()
                    .map_err(|e| AppError::Config(format!("RNG_SEED must be a valid u64: {e}")))
            })
            .transpose()?;

        Ok(Self {
            book_path,
            database_url,
            addr,
            stage_timeout,
            rng_seed,
        })
    }

    /// Engine tunables derived from these settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            stage_timeout: self.stage_timeout,
            ..EngineConfig::default()
        }
    }
}
