/*
 * Responsibility
 * - load settings from environment variables (.env supported)
 * - validate them (missing or invalid values fail startup)
 * - derive durations / audience list once; read-only afterwards
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Time left for signature checks and the handler once key lookup has used
/// its whole budget.
const HTTP_TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings consumed by the token validation core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Timeout for the JWKS request.
    pub request_timeout: Duration,
    pub clock_skew: Duration,
    pub audiences: Vec<String>,
    pub issuer: String,
    pub jwks_url: String,
    /// When set, overrides the token's own `exp` with `iat/nbf + lifetime`.
    pub custom_token_lifetime: Option<Duration>,
    /// `None` keeps fetch-on-demand behaviour (no key cache).
    pub jwks_cache_ttl: Option<Duration>,
    pub jwks_fetch_attempts: u32,
}

pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    /// Whole-request limit of the HTTP layer. Always longer than
    /// `auth.key_fetch_budget()`, so a slow JWKS endpoint ends in a 403
    /// denial rather than a 408.
    pub http_timeout: Duration,
    pub auth: AuthConfig,
}

impl AuthConfig {
    /// Upper bound for one signing key lookup: every fetch attempt at
    /// `request_timeout` plus the backoff between them.
    pub fn key_fetch_budget(&self) -> Duration {
        RetryConfig::with_max_attempts(self.jwks_fetch_attempts).worst_case(self.request_timeout)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let request_timeout = Duration::from_secs(seconds_or(
            "REQUEST_TIMEOUT_SECONDS",
            std::env::var("REQUEST_TIMEOUT_SECONDS").ok(),
            30,
        )?);

        let clock_skew = Duration::from_secs(seconds_or(
            "CLOCK_SKEW_SECONDS",
            std::env::var("CLOCK_SKEW_SECONDS").ok(),
            0,
        )?);

        let audiences = std::env::var("AUDIENCES").map_err(|_| ConfigError::Missing("AUDIENCES"))?;
        let audiences = parse_audiences(&audiences)?;

        let issuer = std::env::var("ISSUER").map_err(|_| ConfigError::Missing("ISSUER"))?;
        if issuer.trim().is_empty() {
            return Err(ConfigError::Invalid("ISSUER"));
        }

        let jwks_url = std::env::var("JWKS_URL").map_err(|_| ConfigError::Missing("JWKS_URL"))?;
        let jwks_url = parse_jwks_url(&jwks_url)?;

        let custom_token_lifetime = optional_seconds(
            "CUSTOM_TOKEN_LIFETIME_SECONDS",
            std::env::var("CUSTOM_TOKEN_LIFETIME_SECONDS").ok(),
        )?
        .map(Duration::from_secs);

        let jwks_cache_ttl = optional_seconds(
            "JWKS_CACHE_TTL_SECONDS",
            std::env::var("JWKS_CACHE_TTL_SECONDS").ok(),
        )?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

        let jwks_fetch_attempts = std::env::var("JWKS_FETCH_ATTEMPTS")
            .ok()
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .map_err(|_| ConfigError::Invalid("JWKS_FETCH_ATTEMPTS"))?
            .unwrap_or(1)
            .max(1);

        let auth = AuthConfig {
            request_timeout,
            clock_skew,
            audiences,
            issuer,
            jwks_url,
            custom_token_lifetime,
            jwks_cache_ttl,
            jwks_fetch_attempts,
        };

        let http_timeout = http_timeout(
            std::env::var("HTTP_TIMEOUT_SECONDS").ok(),
            auth.key_fetch_budget(),
        )?;

        Ok(Self {
            addr,
            app_env,
            http_timeout,
            auth,
        })
    }
}

/// Splits the comma separated `AUDIENCES` value.
///
/// Entries are trimmed. An empty entry is rejected instead of being dropped,
/// so a typo like `api,,web` cannot silently shrink the accepted set.
pub fn parse_audiences(raw: &str) -> Result<Vec<String>, ConfigError> {
    let audiences = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .collect::<Vec<_>>();

    if audiences.iter().any(|a| a.is_empty()) {
        return Err(ConfigError::Invalid("AUDIENCES"));
    }

    Ok(audiences)
}

fn parse_jwks_url(raw: &str) -> Result<String, ConfigError> {
    let url = url::Url::parse(raw.trim()).map_err(|_| ConfigError::Invalid("JWKS_URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        _ => Err(ConfigError::Invalid("JWKS_URL")),
    }
}

/// `HTTP_TIMEOUT_SECONDS`, or by default the key fetch budget plus
/// `HTTP_TIMEOUT_HEADROOM`. An explicit value must exceed the budget.
fn http_timeout(raw: Option<String>, key_fetch_budget: Duration) -> Result<Duration, ConfigError> {
    match optional_seconds("HTTP_TIMEOUT_SECONDS", raw)? {
        Some(secs) if Duration::from_secs(secs) > key_fetch_budget => Ok(Duration::from_secs(secs)),
        Some(_) => Err(ConfigError::Invalid("HTTP_TIMEOUT_SECONDS")),
        None => Ok(key_fetch_budget + HTTP_TIMEOUT_HEADROOM),
    }
}

fn seconds_or(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    Ok(optional_seconds(key, raw)?.unwrap_or(default))
}

fn optional_seconds(key: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<u64>().map(Some).map_err(|_| ConfigError::Invalid(key)),
    }
}
