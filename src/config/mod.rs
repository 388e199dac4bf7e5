use std::env;
use std::str::FromStr;
use std::time::Duration;

use eyre::{bail, Result};

use crate::arb::token::TokenId;

/// Configuration struct for the application
#[derive(Debug, Clone)]
pub struct Config {
    /// Cycles whose realized factor sits below this are discarded
    pub min_profit_factor: f64,
    /// Relaxation depth cap per start token (cycle length bound)
    pub max_path_length: usize,
    /// Parallel searches per snapshot
    pub num_workers: usize,
    /// Tokens where every cycle must begin and end
    pub start_tokens: Vec<TokenId>,
    /// Flush pending updates when no new block arrives for this long
    pub idle_flush_delay: Duration,
    pub snapshot_channel_capacity: usize,
    pub opportunity_channel_capacity: usize,
}

impl Config {
    /// Default values for configuration
    fn defaults() -> Self {
        Self {
            min_profit_factor: 1.001,
            max_path_length: 4,
            num_workers: 4,
            start_tokens: Vec::new(),
            idle_flush_delay: Duration::from_secs(2),
            snapshot_channel_capacity: 10,
            opportunity_channel_capacity: 100,
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Environment Variables:
    /// - `MIN_PROFIT_FACTOR`: realized-profit threshold, must be > 1
    /// - `MAX_PATH_LENGTH`: cycle length bound, must be >= 2
    /// - `NUM_WORKERS`: parallel searches per snapshot, must be >= 1
    /// - `START_TOKENS`: comma-separated token addresses
    /// - `IDLE_FLUSH_DELAY_MS`: pending-update flush timer in milliseconds
    /// - `SNAPSHOT_CHANNEL_CAPACITY` / `OPPORTUNITY_CHANNEL_CAPACITY`
    ///
    /// Unset or unparseable variables fall back to defaults; `START_TOKENS`
    /// entries that are not addresses are skipped with a warning.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_env() -> Self {
        let defaults = Self::defaults();

        Self {
            min_profit_factor: env_parse("MIN_PROFIT_FACTOR", defaults.min_profit_factor),
            max_path_length: env_parse("MAX_PATH_LENGTH", defaults.max_path_length),
            num_workers: env_parse("NUM_WORKERS", defaults.num_workers),
            start_tokens: Self::start_tokens_from_env(),
            idle_flush_delay: Duration::from_millis(env_parse(
                "IDLE_FLUSH_DELAY_MS",
                defaults.idle_flush_delay.as_millis() as u64,
            )),
            snapshot_channel_capacity: env_parse(
                "SNAPSHOT_CHANNEL_CAPACITY",
                defaults.snapshot_channel_capacity,
            ),
            opportunity_channel_capacity: env_parse(
                "OPPORTUNITY_CHANNEL_CAPACITY",
                defaults.opportunity_channel_capacity,
            ),
        }
    }

    fn start_tokens_from_env() -> Vec<TokenId> {
        let Ok(raw) = env::var("START_TOKENS") else {
            return Vec::new();
        };

        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match TokenId::try_from(s) {
                Ok(id) => Some(id),
                Err(e) => {
                    log::warn!("Skipping start token {s}: {e}");
                    None
                }
            })
            .collect()
    }

    /// Reject configurations the pipeline cannot run with.
    ///
    /// # Errors
    /// * If any option is outside its documented range
    /// * If no start tokens are configured
    pub fn validate(&self) -> Result<()> {
        if self.min_profit_factor <= 1.0 {
            bail!(
                "MIN_PROFIT_FACTOR must be > 1, got {}",
                self.min_profit_factor
            );
        }
        if self.max_path_length < 2 {
            bail!("MAX_PATH_LENGTH must be >= 2, got {}", self.max_path_length);
        }
        if self.num_workers < 1 {
            bail!("NUM_WORKERS must be >= 1, got {}", self.num_workers);
        }
        if self.start_tokens.is_empty() {
            bail!("START_TOKENS must name at least one token");
        }
        Ok(())
    }

    /// Create a test configuration
    #[cfg(test)]
    #[must_use]
    pub fn test_config() -> Self {
        Self::defaults()
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
