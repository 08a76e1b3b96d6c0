//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, ops::RangeInclusive, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_CONFIG_PATH";
const MIN_JOIN_CODE_DIGITS: u32 = 4;
const MAX_JOIN_CODE_DIGITS: u32 = 9;

/// Immutable runtime configuration shared across the application.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Room capacity, host included.
    pub max_participants: usize,
    /// Pause between a results screen and the next question when `autoNext` is on.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "autoNextDelayMs")]
    pub auto_next_delay: Duration,
    /// Lifetime of an assembled results payload in the cache.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "resultCacheTtlSecs")]
    pub result_cache_ttl: Duration,
    /// Lifetime of a room snapshot in the cache.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "roomCacheTtlSecs")]
    pub room_cache_ttl: Duration,
    /// Attempts made for each round's history write before warning the host.
    pub history_write_attempts: u32,
    pub join_code_digits: u32,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        max_participants = config.max_participants,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Inclusive range of join codes with exactly the configured number of digits.
    pub fn join_code_range(&self) -> RangeInclusive<u32> {
        let digits = self
            .join_code_digits
            .clamp(MIN_JOIN_CODE_DIGITS, MAX_JOIN_CODE_DIGITS);
        10u32.pow(digits - 1)..=10u32.pow(digits) - 1
    }

    pub fn history_write_attempts(&self) -> u32 {
        self.history_write_attempts.max(1)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_participants: 50,
            auto_next_delay: Duration::from_millis(5_000),
            result_cache_ttl: Duration::from_secs(600),
            room_cache_ttl: Duration::from_secs(7_200),
            history_write_attempts: 3,
            join_code_digits: 6,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
