use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;

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

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,
    pub cart_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Supabase Auth
    pub supabase_jwt_jwks_url: String,
    pub supabase_jwt_issuer: String,
    pub supabase_jwt_audience: String,
    pub supabase_jwt_secret: Option<String>,
    pub jwks_cache_ttl_seconds: u64,

    // Supabase API (for auth proxy)
    pub supabase_url: String,
    pub supabase_anon_key: String,

    // Razorpay
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: String,
    pub razorpay_api_base: String,
    pub razorpay_timeout_seconds: u64,
    pub payment_currency: String,

    /// Platform commission in basis points (1/100 of a percent)
    pub platform_fee_bps: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let env = Environment::from_str(&or_default("ENV", "dev"));
        let server_addr = or_default("SERVER_ADDR", "0.0.0.0:8080");

        // Database
        let database_url = required("DATABASE_URL")?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10);
        let run_migrations = parse_or(&lookup, "RUN_MIGRATIONS", false);

        // Redis
        let redis_url = or_default("REDIS_URL", "redis://redis:6379/0");
        let redis_cache_ttl_seconds = parse_or(&lookup, "REDIS_CACHE_TTL_SECONDS", 300);
        let cart_ttl_seconds = parse_or(&lookup, "CART_TTL_SECONDS", 86400);

        // CORS
        let cors_allow_origins = or_default("CORS_ALLOW_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Supabase Auth
        let supabase_jwt_jwks_url = required("SUPABASE_JWT_JWKS_URL")?;
        let supabase_jwt_issuer = required("SUPABASE_JWT_ISSUER")?;
        let supabase_jwt_audience = or_default("SUPABASE_JWT_AUDIENCE", "authenticated");
        let supabase_jwt_secret = lookup("SUPABASE_JWT_SECRET").filter(|s| !s.is_empty());
        let jwks_cache_ttl_seconds = parse_or(&lookup, "JWKS_CACHE_TTL_SECONDS", 1800);

        let supabase_url = required("SUPABASE_URL")?;
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;

        // Razorpay
        let razorpay_key_id = required("RAZORPAY_KEY_ID")?;
        let razorpay_key_secret = required("RAZORPAY_KEY_SECRET")?;
        let razorpay_webhook_secret = required("RAZORPAY_WEBHOOK_SECRET")?;
        let razorpay_api_base = or_default("RAZORPAY_API_BASE", "https://api.razorpay.com/v1");
        url::Url::parse(&razorpay_api_base).context("RAZORPAY_API_BASE is not a valid URL")?;
        let razorpay_timeout_seconds = parse_or(&lookup, "RAZORPAY_TIMEOUT_SECONDS", 15);
        let payment_currency = or_default("PAYMENT_CURRENCY", "INR").to_uppercase();

        let platform_fee_bps: u32 = match lookup("PLATFORM_FEE_BPS") {
            Some(raw) => raw.trim().parse().with_context(|| {
                format!(
                    "PLATFORM_FEE_BPS must be an integer between 0 and 10000, got {:?}",
                    raw
                )
            })?,
            None => 500,
        };
        if platform_fee_bps > 10_000 {
            bail!("PLATFORM_FEE_BPS must be between 0 and 10000");
        }

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            run_migrations,
            redis_url,
            redis_cache_ttl_seconds,
            cart_ttl_seconds,
            cors_allow_origins,
            supabase_jwt_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            supabase_jwt_secret,
            jwks_cache_ttl_seconds,
            supabase_url,
            supabase_anon_key,
            razorpay_key_id,
            razorpay_key_secret,
            razorpay_webhook_secret,
            razorpay_api_base,
            razorpay_timeout_seconds,
            payment_currency,
            platform_fee_bps,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
