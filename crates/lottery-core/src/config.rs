//! Configuration for the agency client.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CLI_CONFIG (explicit override)
//!   2. ./config.toml
//!
//! A missing file is not an error; the defaults apply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Client identifier, used only in logs.
    pub id: String,
    /// Aggregator `host:port`.
    pub server_address: String,
    /// Pause between consecutive chunk submissions, in milliseconds.
    pub loop_period_ms: u64,
    /// Maximum bets per chunk. Clamped further by the chunk byte budget.
    pub batch_max_amount: usize,
    /// Agency identifier sent with every request.
    pub agency: u32,
    /// CSV file holding this agency's bets.
    pub data_path: PathBuf,
    /// Extra dial attempts after the first one fails.
    pub connect_retries: u32,
    /// Delay between dial attempts.
    pub connect_backoff: Backoff,
    /// Delay between "not ready" winners polls.
    pub poll_backoff: Backoff,
    /// Give up polling after this many attempts. None = poll until
    /// success or cancellation.
    pub poll_max_attempts: Option<u32>,
    /// Deadline for one exchange after the connection is up, in
    /// milliseconds. None = no deadline.
    pub io_timeout_ms: Option<u64>,
    /// Default tracing filter when RUST_LOG is unset.
    pub log_level: String,
}

/// Deterministic delay schedule for retries.
///
/// In TOML, `kind` is required; a missing `initial_ms` or `max_ms` takes the
/// default for that kind (fixed 1 s, doubling 100 ms → 5 s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BackoffTable")]
pub struct Backoff {
    pub kind: BackoffKind,
    pub initial_ms: u64,
    /// Ceiling for `Doubling`. Ignored by `Fixed`.
    pub max_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry.
    Fixed,
    /// `initial × 2^(attempt-1)`, capped at `max`.
    Doubling,
}

const FIXED_DELAY_MS: u64 = 1_000;
const DOUBLING_INITIAL_MS: u64 = 100;
const DOUBLING_MAX_MS: u64 = 5_000;

#[derive(Deserialize)]
struct BackoffTable {
    kind: BackoffKind,
    initial_ms: Option<u64>,
    max_ms: Option<u64>,
}

impl From<BackoffTable> for Backoff {
    fn from(table: BackoffTable) -> Self {
        match table.kind {
            BackoffKind::Fixed => Backoff::fixed(table.initial_ms.unwrap_or(FIXED_DELAY_MS)),
            BackoffKind::Doubling => {
                let initial_ms = table.initial_ms.unwrap_or(DOUBLING_INITIAL_MS);
                // a missing ceiling never sits below the initial delay
                let max_ms = table
                    .max_ms
                    .unwrap_or_else(|| DOUBLING_MAX_MS.max(initial_ms));
                Backoff::doubling(initial_ms, max_ms)
            }
        }
    }
}

impl Backoff {
    pub const fn fixed(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial_ms: delay_ms,
            max_ms: delay_ms,
        }
    }

    pub const fn doubling(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Doubling,
            initial_ms,
            max_ms,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = match self.kind {
            BackoffKind::Fixed => self.initial_ms,
            BackoffKind::Doubling => {
                let exp = attempt.saturating_sub(1).min(63);
                self.initial_ms
                    .saturating_mul(1u64 << exp)
                    .min(self.max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: "1".to_string(),
            server_address: "server:12345".to_string(),
            loop_period_ms: 0,
            batch_max_amount: 100,
            agency: 1,
            data_path: PathBuf::from("/.data/agency-1.csv"),
            connect_retries: 5,
            connect_backoff: Backoff::doubling(DOUBLING_INITIAL_MS, DOUBLING_MAX_MS),
            poll_backoff: Backoff::fixed(FIXED_DELAY_MS),
            poll_max_attempts: None,
            io_timeout_ms: None,
            log_level: "info".to_string(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ClientConfig {
    /// Load config: env vars → file → defaults, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CLI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    /// Read `path` if it exists, otherwise return defaults.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Apply CLI_* overrides. `lookup` is `std::env::var` in production;
    /// tests pass a map so they never touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLI_ID") {
            self.id = v;
        }
        if let Some(v) = lookup("CLI_SERVER_ADDRESS") {
            self.server_address = v;
        }
        if let Some(v) = lookup("CLI_LOOP_PERIOD_MS") {
            self.loop_period_ms = parse_env("CLI_LOOP_PERIOD_MS", v)?;
        }
        if let Some(v) = lookup("CLI_BATCH_MAXAMOUNT") {
            self.batch_max_amount = parse_env("CLI_BATCH_MAXAMOUNT", v)?;
        }
        if let Some(v) = lookup("CLI_AGENCY") {
            self.agency = parse_env("CLI_AGENCY", v)?;
        }
        if let Some(v) = lookup("CLI_DATA_PATH") {
            self.data_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLI_CONNECT_RETRIES") {
            self.connect_retries = parse_env("CLI_CONNECT_RETRIES", v)?;
        }
        if let Some(v) = lookup("CLI_POLL_MAX_ATTEMPTS") {
            self.poll_max_attempts = Some(parse_env("CLI_POLL_MAX_ATTEMPTS", v)?);
        }
        if let Some(v) = lookup("CLI_IO_TIMEOUT_MS") {
            self.io_timeout_ms = Some(parse_env("CLI_IO_TIMEOUT_MS", v)?);
        }
        if let Some(v) = lookup("CLI_LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server_address is empty".into()));
        }
        if self.batch_max_amount == 0 {
            return Err(ConfigError::Invalid("batch_max_amount must be at least 1".into()));
        }
        if self.poll_max_attempts == Some(0) {
            return Err(ConfigError::Invalid("poll_max_attempts must be at least 1".into()));
        }
        for (name, backoff) in [
            ("connect_backoff", &self.connect_backoff),
            ("poll_backoff", &self.poll_backoff),
        ] {
            if backoff.kind == BackoffKind::Doubling && backoff.initial_ms > backoff.max_ms {
                return Err(ConfigError::Invalid(format!(
                    "{name}: initial_ms {} exceeds max_ms {}",
                    backoff.initial_ms, backoff.max_ms
                )));
            }
        }
        Ok(())
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
