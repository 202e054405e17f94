use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,
    pub max_body_bytes: usize,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Supabase Auth
    pub supabase_jwt_jwks_url: String,
    pub supabase_jwt_issuer: String,
    pub supabase_jwt_audience: String,
    pub jwks_cache_ttl_seconds: u64,

    // Supabase API (for auth proxy)
    pub supabase_url: String,
    pub supabase_anon_key: String,

    // Stripe
    pub stripe_api_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_timeout_seconds: u64,
    pub stripe_webhook_tolerance_seconds: i64,
    pub default_currency: String,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let max_body_bytes = parse_or("MAX_BODY_BYTES", 2 * 1024 * 1024);

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);
        let run_migrations = env::var("RUN_MIGRATIONS")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(true);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = parse_or("REDIS_CACHE_TTL_SECONDS", 3600);

        // CORS
        let cors_allow_origins = split_list(
            &env::var("CORS_ALLOW_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );

        // Supabase Auth
        let supabase_jwt_jwks_url =
            env::var("SUPABASE_JWT_JWKS_URL").context("SUPABASE_JWT_JWKS_URL must be set")?;
        let supabase_jwt_issuer =
            env::var("SUPABASE_JWT_ISSUER").context("SUPABASE_JWT_ISSUER must be set")?;
        let supabase_jwt_audience =
            env::var("SUPABASE_JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());
        let jwks_cache_ttl_seconds = parse_or("JWKS_CACHE_TTL_SECONDS", 1800); // 30 minutes

        let supabase_url = env::var("SUPABASE_URL").context("SUPABASE_URL must be set")?;
        let supabase_anon_key =
            env::var("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY must be set")?;

        // Stripe
        let stripe_api_url =
            env::var("STRIPE_API_URL").unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let stripe_secret_key =
            env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;
        let stripe_webhook_secret =
            env::var("STRIPE_WEBHOOK_SECRET").context("STRIPE_WEBHOOK_SECRET must be set")?;
        let stripe_timeout_seconds = parse_or("STRIPE_TIMEOUT_SECONDS", 30);
        let stripe_webhook_tolerance_seconds = parse_or("STRIPE_WEBHOOK_TOLERANCE_SECONDS", 300);
        let default_currency = env::var("DEFAULT_CURRENCY")
            .unwrap_or_else(|_| "usd".to_string())
            .to_lowercase();

        Ok(Settings {
            env,
            server_addr,
            max_body_bytes,
            database_url,
            database_max_connections,
            run_migrations,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            supabase_jwt_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            jwks_cache_ttl_seconds,
            supabase_url,
            supabase_anon_key,
            stripe_api_url,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_timeout_seconds,
            stripe_webhook_tolerance_seconds,
            default_currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_dev() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("PROD"), Environment::Prod);
        assert_eq!(Environment::from_str("staging"), Environment::Staging);
        assert_eq!(Environment::from_str("anything"), Environment::Dev);
        assert!(Environment::Dev.is_dev());
        assert!(!Environment::Staging.is_prod());
    }

    #[test]
    fn bool_flags() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn origin_list_skips_blanks() {
        assert_eq!(
            split_list("http://a.test, ,http://b.test,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
