// Process configuration loaded once at startup

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::auth::providers::ProviderConfig;

const APPLE_ISSUER: &str = "https://appleid.apple.com";
const APPLE_JWKS_URI: &str = "https://appleid.apple.com/auth/keys";
const APPLE_CLIENT_ID: &str = "tech.bunkbed.fushigi";

const GOOGLE_ISSUER: &str = "https://accounts.google.com";
const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET_KEY must be set to a non-empty value")]
    MissingSecret,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the service needs to know about its environment.
///
/// Built by [`AppConfig::from_env`] in `main` and handed to each component
/// at construction time.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub http_timeout: Duration,
    pub db_timeout: Duration,
    pub db_max_connections: u32,
    pub jwks_cache_ttl: Duration,
    pub jwks_min_refetch: Duration,
    pub token_leeway_secs: u64,
    pub cors_origins: Vec<String>,
    pub providers: Vec<ProviderConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // No fallback secret: a missing key is a startup failure.
        let jwt_secret = var("JWT_SECRET_KEY").ok_or(ConfigError::MissingSecret)?;

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite://auth.db".to_string());
        let port = parse_or("PORT", var("PORT"), 8080u16)?;
        let http_timeout = Duration::from_secs(parse_or(
            "HTTP_TIMEOUT_SECS",
            var("HTTP_TIMEOUT_SECS"),
            5u64,
        )?);
        let db_timeout =
            Duration::from_secs(parse_or("DB_TIMEOUT_SECS", var("DB_TIMEOUT_SECS"), 5u64)?);
        let db_max_connections =
            parse_or("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 5u32)?;
        let jwks_cache_ttl = Duration::from_secs(parse_or(
            "JWKS_CACHE_TTL_SECS",
            var("JWKS_CACHE_TTL_SECS"),
            3600u64,
        )?);
        let jwks_min_refetch = Duration::from_secs(parse_or(
            "JWKS_MIN_REFETCH_SECS",
            var("JWKS_MIN_REFETCH_SECS"),
            10u64,
        )?);
        let token_leeway_secs = parse_or("TOKEN_LEEWAY_SECS", var("TOKEN_LEEWAY_SECS"), 0u64)?;

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut providers = vec![ProviderConfig {
            name: "apple".to_string(),
            client_id: var("APPLE_CLIENT_ID").unwrap_or_else(|| APPLE_CLIENT_ID.to_string()),
            issuer: var("APPLE_ISSUER").unwrap_or_else(|| APPLE_ISSUER.to_string()),
            jwks_uri: var("APPLE_JWKS_URI").unwrap_or_else(|| APPLE_JWKS_URI.to_string()),
        }];

        if let Some(client_id) = var("GOOGLE_CLIENT_ID") {
            providers.push(ProviderConfig {
                name: "google".to_string(),
                client_id,
                issuer: var("GOOGLE_ISSUER").unwrap_or_else(|| GOOGLE_ISSUER.to_string()),
                jwks_uri: var("GOOGLE_JWKS_URI").unwrap_or_else(|| GOOGLE_JWKS_URI.to_string()),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            port,
            http_timeout,
            db_timeout,
            db_max_connections,
            jwks_cache_ttl,
            jwks_min_refetch,
            token_leeway_secs,
            cors_origins,
            providers,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
