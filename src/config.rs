//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;
use std::time::Duration;

use crate::services::retry::RetryPolicy;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `EXPLORER_API_KEY` (required): block explorer API key
/// - `EXPLORER_BASE_URL` (optional): explorer endpoint, defaults to Etherscan v2
/// - `SYNC_INTERVAL_SECS` (optional): scheduler period, `0` disables it
///
/// The remaining fields tune pagination, backoff, payout filtering and
/// incident detection; see the defaults below.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_explorer_base_url")]
    pub explorer_base_url: String,

    pub explorer_api_key: String,

    #[serde(default = "default_page_size")]
    pub explorer_page_size: u32,

    #[serde(default = "default_max_pages")]
    pub explorer_max_pages: u32,

    #[serde(default = "default_explorer_timeout_secs")]
    pub explorer_timeout_secs: u64,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Comma separated token symbols that count as payouts.
    #[serde(default = "default_payout_tokens")]
    pub payout_tokens: String,

    /// Transfers below this amount are treated as dust / address poisoning.
    #[serde(default = "default_min_payout_cents")]
    pub min_payout_cents: i64,

    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_incident_window_days")]
    pub incident_window_days: i64,

    #[serde(default = "default_incident_review_threshold")]
    pub incident_review_threshold: usize,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_explorer_base_url() -> String {
    "https://api.etherscan.io/v2/api".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_pages() -> u32 {
    10
}

fn default_explorer_timeout_secs() -> u64 {
    20
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_payout_tokens() -> String {
    "USDC,USDT,USDC.E".to_string()
}

fn default_min_payout_cents() -> i64 {
    1000
}

fn default_snapshot_dir() -> String {
    "data/payouts".to_string()
}

fn default_sync_interval_secs() -> u64 {
    1800
}

fn default_incident_window_days() -> i64 {
    7
}

fn default_incident_review_threshold() -> usize {
    3
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Backoff policy shared by explorer requests and database retries.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Upper-cased payout token symbols, empty entries dropped.
    pub fn payout_token_symbols(&self) -> Vec<String> {
        self.payout_tokens
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// `None` when the scheduler is disabled.
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }
}
