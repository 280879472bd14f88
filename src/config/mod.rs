use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub site_server: ServerConfig,
    pub site: SiteConfig,
    pub analytics: AnalyticsConfig,
    pub pagination: PaginationConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory served (and tracked) by the site server.
    /// If None, every site request gets a tracked 404.
    pub static_dir: Option<String>,
}

/// How session ids are derived from the client IP and ingestion time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionScheme {
    /// `{ip}_{epoch_ms}`: one session per request
    Literal,
    /// `{ip}_{bucket_start_ms}`: requests from one IP inside a time bucket share a session
    Bucketed { bucket_minutes: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub session_scheme: SessionScheme,
    /// A visitor whose last visit is older than this counts as new again
    pub new_visitor_window_days: i64,
    /// Fixed offset used to cut calendar days for overview and trend
    pub utc_offset_minutes: i32,
    /// Upper bound for a single trend computation
    pub query_timeout_secs: u64,
    /// Closed days kept in the rollup cache, 0 disables it
    pub rollup_cache_max_days: u64,
    /// How long after midnight a day is still considered open
    pub rollup_grace_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            session_scheme: SessionScheme::Literal,
            new_visitor_window_days: 30,
            utc_offset_minutes: 0,
            query_timeout_secs: 30,
            rollup_cache_max_days: 400,
            rollup_grace_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub cursor_hmac_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional numeric variable, warning and falling back on garbage
fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {key} '{raw}', falling back to {default}");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str = env_or("DATABASE_BACKEND", "sqlite");

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = env_or("DATABASE_URL", "sqlite://./footfall.db");
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 5u32);

        let api_host = env_or("API_HOST", "127.0.0.1");
        let api_port = env_or("API_PORT", "8080").parse::<u16>()?;

        let site_host = env_or("SITE_HOST", "127.0.0.1");
        let site_port = env_or("SITE_PORT", "3000").parse::<u16>()?;

        let bucket_minutes = env_parse("SESSION_BUCKET_MINUTES", 30u32).max(1);
        let session_scheme = match env_or("SESSION_SCHEME", "literal").to_lowercase().as_str() {
            "literal" => SessionScheme::Literal,
            "bucketed" => SessionScheme::Bucketed { bucket_minutes },
            other => {
                tracing::warn!(
                    "Unknown SESSION_SCHEME '{other}', falling back to 'literal'. Supported values: literal, bucketed"
                );
                SessionScheme::Literal
            }
        };

        let defaults = AnalyticsConfig::default();
        let analytics = AnalyticsConfig {
            session_scheme,
            new_visitor_window_days: env_parse(
                "NEW_VISITOR_WINDOW_DAYS",
                defaults.new_visitor_window_days,
            ),
            utc_offset_minutes: env_parse("STATS_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes),
            query_timeout_secs: env_parse("QUERY_TIMEOUT_SECS", defaults.query_timeout_secs),
            rollup_cache_max_days: env_parse(
                "ROLLUP_CACHE_MAX_DAYS",
                defaults.rollup_cache_max_days,
            ),
            rollup_grace_secs: env_parse("ROLLUP_GRACE_SECS", defaults.rollup_grace_secs),
        };

        let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            site_server: ServerConfig {
                host: site_host,
                port: site_port,
            },
            site: SiteConfig {
                static_dir: std::env::var("SITE_STATIC_DIR").ok(),
            },
            analytics,
            pagination: PaginationConfig {
                cursor_hmac_secret: std::env::var("CURSOR_HMAC_SECRET").ok(),
            },
            cors: CorsConfig { allowed_origins },
        })
    }
}
