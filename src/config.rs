//! Connection and sweep configuration

use crate::error::{Error, Result};
use crate::mutator::{DEFAULT_RATE_LIMIT_DELAY, DEFAULT_RETRY_BASE_DELAY, MAX_BATCH_SIZE};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// IMAP connection configuration for Proton Bridge
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Folder that mutations and unlabelled searches operate on.
    pub folder: String,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_PORT` (default: `1143`)
    /// - `IMAP_FOLDER` (default: `INBOX`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or
    /// `IMAP_PORT` is not a port number.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("IMAP_PORT", 1143)?,
            username: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            password: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            folder: env::var("IMAP_FOLDER").unwrap_or_else(|_| "INBOX".to_string()),
        })
    }
}

/// Tuning knobs for bulk mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSettings {
    pub batch_size: usize,
    pub rate_limit_delay: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            max_retries: 3,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl SweepSettings {
    /// Load sweep settings from environment variables
    ///
    /// All optional:
    /// - `SWEEP_BATCH_SIZE` (default: `100`)
    /// - `SWEEP_RATE_LIMIT_MS` (default: `100`)
    /// - `SWEEP_MAX_RETRIES` (default: `3`)
    /// - `SWEEP_RETRY_BASE_MS` (default: `1000`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but not a number.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            batch_size: parse_var("SWEEP_BATCH_SIZE", defaults.batch_size)?,
            rate_limit_delay: Duration::from_millis(parse_var(
                "SWEEP_RATE_LIMIT_MS",
                duration_millis(defaults.rate_limit_delay),
            )?),
            max_retries: parse_var("SWEEP_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_var(
                "SWEEP_RETRY_BASE_MS",
                duration_millis(defaults.retry_base_delay),
            )?),
        })
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
