//! offerd configuration
//!
//! Environment-driven configuration. Every deployment knob comes from an
//! environment variable; variables without a default are fatal at
//! startup so a misconfigured instance never serves traffic.
//!
//! # Variables
//!
//! | Variable | Default | Purpose |
//! |---|---|---|
//! | `SERVER_PORT` | `8080` | HTTP listen port |
//! | `API_TIMEOUT_SEC` | `30` | Whole-fleet deadline per request |
//! | `FRESHNESS_WINDOW_SEC` | `5` | Cache age below which no refetch happens |
//! | `RETRY_FREQUENCY_MILLI` | `1000,2000,3000` | Retry delays for provider calls |
//! | `DATABASE_URL/_USER/_PASSWORD/_NAME` | (required) | Share store (MongoDB) |
//! | `OFFER_CACHE_URL/_PASSWORD` | (required) | Address cache (Redis) |
//! | `USER_OFFER_CACHE_URL/_PASSWORD` | (required) | User cache (Redis) |
//! | `BYTEME_API_KEY` etc. | (required) | Per-provider credentials |
//! | `DEBUG` | `false` | Verbose logging |

mod error;

use std::time::Duration;

pub use error::{ConfigError, Result};

/// Default retry schedule for provider calls, in milliseconds.
pub const DEFAULT_RETRY_FREQUENCY_MILLI: [u64; 3] = [1000, 2000, 3000];

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub share_db: ShareDbConfig,
    pub address_cache: CacheConfig,
    pub user_cache: CacheConfig,
    pub providers: ProviderCredentials,
    pub debug: bool,
}

/// HTTP server and pipeline timing knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Ceiling for one whole provider fleet run.
    pub api_timeout: Duration,
    /// Address-cache entries younger than this are served without a
    /// refetch.
    pub freshness_window: Duration,
    /// Delays between provider-call retries; the length of the list is
    /// the retry count.
    pub retry_delays: Vec<Duration>,
}

/// MongoDB connection settings for the share store.
#[derive(Debug, Clone)]
pub struct ShareDbConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// One Redis cache namespace (host:port plus password).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub url: String,
    pub password: String,
}

impl CacheConfig {
    /// Build the redis connection URL, folding the password in when one
    /// is configured. The configured url is expected to be `host:port`.
    pub fn connection_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}", self.url)
        } else {
            format!("redis://:{}@{}", self.password, self.url)
        }
    }
}

/// Credentials for the five upstream provider APIs.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub byteme: ByteMeCredentials,
    pub pingperfect: PingPerfectCredentials,
    pub servusspeed: ServusSpeedCredentials,
    pub verbyndich: VerbynDichCredentials,
    pub webwunder: WebWunderCredentials,
}

#[derive(Debug, Clone)]
pub struct ByteMeCredentials {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct PingPerfectCredentials {
    pub client_id: String,
    pub signature_secret: String,
}

#[derive(Debug, Clone)]
pub struct ServusSpeedCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct VerbynDichCredentials {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct WebWunderCredentials {
    pub api_key: String,
}

impl Config {
    /// Load the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first variable that is missing or
    /// unparsable. Callers are expected to treat this as fatal.
    pub fn from_env() -> Result<Self> {
        Self::from_source(&|var| std::env::var(var).ok())
    }

    /// Load the configuration from an arbitrary variable source.
    ///
    /// Extracted from `from_env` so tests can supply variables without
    /// mutating the process environment.
    pub fn from_source(source: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let server = ServerConfig {
            port: parse_or(source, "SERVER_PORT", 8080)?,
            api_timeout: Duration::from_secs(parse_or(source, "API_TIMEOUT_SEC", 30)?),
            freshness_window: Duration::from_secs(parse_or(source, "FRESHNESS_WINDOW_SEC", 5)?),
            retry_delays: parse_retry_delays(source)?,
        };

        let share_db = ShareDbConfig {
            url: require(source, "DATABASE_URL")?,
            user: require(source, "DATABASE_USER")?,
            password: require(source, "DATABASE_PASSWORD")?,
            name: require(source, "DATABASE_NAME")?,
        };

        let address_cache = CacheConfig {
            url: require(source, "OFFER_CACHE_URL")?,
            password: require(source, "OFFER_CACHE_PASSWORD")?,
        };

        let user_cache = CacheConfig {
            url: require(source, "USER_OFFER_CACHE_URL")?,
            password: require(source, "USER_OFFER_CACHE_PASSWORD")?,
        };

        let providers = ProviderCredentials {
            byteme: ByteMeCredentials {
                api_key: require(source, "BYTEME_API_KEY")?,
            },
            pingperfect: PingPerfectCredentials {
                client_id: require(source, "PINGPERFECT_CLIENT_ID")?,
                signature_secret: require(source, "PINGPERFECT_SIGNATURE_SECRET")?,
            },
            servusspeed: ServusSpeedCredentials {
                username: require(source, "SERVUSSPEED_USERNAME")?,
                password: require(source, "SERVUSSPEED_PASSWORD")?,
            },
            verbyndich: VerbynDichCredentials {
                api_key: require(source, "VERBYNDICH_API_KEY")?,
            },
            webwunder: WebWunderCredentials {
                api_key: require(source, "WEBWUNDER_API_KEY")?,
            },
        };

        let debug = parse_or(source, "DEBUG", false)?;

        Ok(Self {
            server,
            share_db,
            address_cache,
            user_cache,
            providers,
            debug,
        })
    }
}

/// Fetch a required variable; empty values count as missing.
fn require(source: &dyn Fn(&str) -> Option<String>, var: &'static str) -> Result<String> {
    match source(var) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::missing(var)),
    }
}

/// Parse an optional variable, falling back to a default when unset.
fn parse_or<T: std::str::FromStr>(
    source: &dyn Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match source(var) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, e.to_string())),
        _ => Ok(default),
    }
}

/// Parse `RETRY_FREQUENCY_MILLI`, a comma-separated list of millisecond
/// delays.
fn parse_retry_delays(source: &dyn Fn(&str) -> Option<String>) -> Result<Vec<Duration>> {
    const VAR: &str = "RETRY_FREQUENCY_MILLI";

    let raw = match source(VAR) {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            return Ok(DEFAULT_RETRY_FREQUENCY_MILLI
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect())
        }
    };

    raw.split(',')
        .map(|entry| {
            entry
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::invalid("RETRY_FREQUENCY_MILLI", e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "mongodb://localhost:27017"),
            ("DATABASE_USER", "offerd"),
            ("DATABASE_PASSWORD", "secret"),
            ("DATABASE_NAME", "offerd"),
            ("OFFER_CACHE_URL", "localhost:6379"),
            ("OFFER_CACHE_PASSWORD", "redispw"),
            ("USER_OFFER_CACHE_URL", "localhost:6380"),
            ("USER_OFFER_CACHE_PASSWORD", ""),
            ("BYTEME_API_KEY", "bm-key"),
            ("PINGPERFECT_CLIENT_ID", "pp-client"),
            ("PINGPERFECT_SIGNATURE_SECRET", "pp-secret"),
            ("SERVUSSPEED_USERNAME", "ss-user"),
            ("SERVUSSPEED_PASSWORD", "ss-pass"),
            ("VERBYNDICH_API_KEY", "vd-key"),
            ("WEBWUNDER_API_KEY", "ww-key"),
        ])
    }

    fn source_from(env: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |var| env.get(var).map(|v| v.to_string())
    }

    #[test]
    fn loads_with_defaults() {
        let mut env = full_env();
        env.insert("USER_OFFER_CACHE_PASSWORD", "x");
        let config = Config::from_source(&source_from(env)).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_timeout, Duration::from_secs(30));
        assert_eq!(config.server.freshness_window, Duration::from_secs(5));
        assert_eq!(
            config.server.retry_delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
        assert!(!config.debug);
    }

    #[test]
    fn missing_credential_is_fatal() {
        let mut env = full_env();
        env.insert("USER_OFFER_CACHE_PASSWORD", "x");
        env.remove("WEBWUNDER_API_KEY");

        let err = Config::from_source(&source_from(env)).unwrap_err();
        assert!(err.to_string().contains("WEBWUNDER_API_KEY"));
    }

    #[test]
    fn empty_required_value_counts_as_missing() {
        // USER_OFFER_CACHE_PASSWORD is set to "" in full_env
        let err = Config::from_source(&source_from(full_env())).unwrap_err();
        assert!(err.to_string().contains("USER_OFFER_CACHE_PASSWORD"));
    }

    #[test]
    fn retry_schedule_parses_custom_values() {
        let mut env = full_env();
        env.insert("USER_OFFER_CACHE_PASSWORD", "x");
        env.insert("RETRY_FREQUENCY_MILLI", "500, 1500");

        let config = Config::from_source(&source_from(env)).unwrap();
        assert_eq!(
            config.server.retry_delays,
            vec![Duration::from_millis(500), Duration::from_millis(1500)]
        );
    }

    #[test]
    fn invalid_retry_schedule_is_rejected() {
        let mut env = full_env();
        env.insert("USER_OFFER_CACHE_PASSWORD", "x");
        env.insert("RETRY_FREQUENCY_MILLI", "500,fast");

        let err = Config::from_source(&source_from(env)).unwrap_err();
        assert!(err.to_string().contains("RETRY_FREQUENCY_MILLI"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut env = full_env();
        env.insert("USER_OFFER_CACHE_PASSWORD", "x");
        env.insert("SERVER_PORT", "eighty");

        let err = Config::from_source(&source_from(env)).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn cache_url_folds_password_in() {
        let with_password = CacheConfig {
            url: "localhost:6379".into(),
            password: "pw".into(),
        };
        assert_eq!(with_password.connection_url(), "redis://:pw@localhost:6379");

        let without_password = CacheConfig {
            url: "localhost:6379".into(),
            password: String::new(),
        };
        assert_eq!(without_password.connection_url(), "redis://localhost:6379");
    }
}
