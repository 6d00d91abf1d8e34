use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Process-wide configuration, read once from the environment.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[derive(Clone, Debug)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: String,
    /// Largest number of articles a single request may ask for.
    pub max_limit: i64,
    /// Limit applied when the caller does not specify one.
    pub default_limit: i64,
    /// Default radius for nearby searches, in kilometers.
    pub default_radius_km: f64,
    /// Largest radius accepted for nearby and trending searches.
    pub max_radius_km: f64,
    /// Trailing window used for the "recent interactions" trending signal.
    pub trending_window_hours: i64,
    /// How many per-article summary calls may be in flight at once.
    pub summary_concurrency: usize,
    /// Per-call timeout for summary generation.
    pub summary_timeout: Duration,
    /// Per-call timeout for query classification.
    pub classify_timeout: Duration,
}

impl Config {
    fn from_env() -> Self {
        Config {
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "geonews.db".to_string()),
            max_limit: env_parse("MAX_LIMIT", 20),
            default_limit: env_parse("DEFAULT_LIMIT", 5),
            default_radius_km: env_parse("DEFAULT_RADIUS_KM", 10.0),
            max_radius_km: env_parse("MAX_RADIUS_KM", 100.0),
            trending_window_hours: env_parse("TRENDING_WINDOW_HOURS", 24),
            summary_concurrency: env_parse("SUMMARY_CONCURRENCY", 5),
            summary_timeout: Duration::from_secs(env_parse("SUMMARY_TIMEOUT_SECS", 10)),
            classify_timeout: Duration::from_secs(env_parse("CLASSIFY_TIMEOUT_SECS", 15)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    parse_or_default(env::var(var).ok(), default)
}

fn parse_or_default<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}
