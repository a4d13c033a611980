// Configuration module for n3mo
// Reads from environment variables with sensible defaults

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database read pool size (N3MO_POOL_SIZE)
    pub pool_size: u32,

    /// Database read pool minimum idle connections (N3MO_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Attempts to open the store before giving up (N3MO_CONNECT_RETRIES)
    pub connect_retries: u32,

    /// Initial backoff between store open attempts, doubled each retry (N3MO_CONNECT_BACKOFF_MS)
    pub connect_backoff_ms: u64,

    /// Deadline for a single impact traversal in seconds (N3MO_IMPACT_TIMEOUT_SECS)
    pub impact_timeout_secs: u64,

    /// Default traversal depth for impact queries (N3MO_MAX_DEPTH)
    pub max_depth: usize,

    /// Files above this size are skipped during ingestion (N3MO_MAX_FILE_SIZE_MB)
    pub max_file_size_mb: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_min_idle: 2,
            connect_retries: 5,
            connect_backoff_ms: 200,
            impact_timeout_secs: 5,
            max_depth: 5,
            max_file_size_mb: 10,
        }
    }
}

fn override_from_env<T>(key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    override_from(key, env::var(key).ok(), slot);
}

fn override_from<T>(key: &str, raw: Option<String>, slot: &mut T)
where
    T: FromStr + std::fmt::Display,
{
    let Some(val) = raw else {
        return;
    };
    match val.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(
            "invalid {key} value: {val}, using default: {}",
            slot
        ),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();
        override_from_env("N3MO_POOL_SIZE", &mut config.pool_size);
        override_from_env("N3MO_POOL_MIN_IDLE", &mut config.pool_min_idle);
        override_from_env("N3MO_CONNECT_RETRIES", &mut config.connect_retries);
        override_from_env("N3MO_CONNECT_BACKOFF_MS", &mut config.connect_backoff_ms);
        override_from_env("N3MO_IMPACT_TIMEOUT_SECS", &mut config.impact_timeout_secs);
        override_from_env("N3MO_MAX_DEPTH", &mut config.max_depth);
        override_from_env("N3MO_MAX_FILE_SIZE_MB", &mut config.max_file_size_mb);
        config.clamped()
    }

    /// At least one open attempt and one traversal level.
    fn clamped(mut self) -> Self {
        self.connect_retries = self.connect_retries.max(1);
        self.max_depth = self.max_depth.max(1);
        self
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.pool_min_idle, 2);
        assert_eq!(config.connect_retries, 5);
        assert_eq!(config.connect_backoff_ms, 200);
        assert_eq!(config.impact_timeout_secs, 5);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_file_size_mb, 10);
    }

    #[test]
    fn invalid_override_keeps_default() {
        let mut value: u32 = 7;
        override_from("N3MO_POOL_SIZE", Some("not-a-number".to_string()), &mut value);
        assert_eq!(value, 7);
        override_from("N3MO_POOL_SIZE", None, &mut value);
        assert_eq!(value, 7);
        override_from("N3MO_POOL_SIZE", Some("42".to_string()), &mut value);
        assert_eq!(value, 42);
    }

    #[test]
    fn zero_depth_and_retries_are_clamped() {
        let mut config = Config::default();
        override_from("N3MO_MAX_DEPTH", Some("0".to_string()), &mut config.max_depth);
        override_from("N3MO_CONNECT_RETRIES", Some("0".to_string()), &mut config.connect_retries);
        let config = config.clamped();
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.connect_retries, 1);
    }
}
