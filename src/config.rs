use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// When absent the process runs against in-memory stores (demo mode).
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub seed_demo_accounts: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            // No fallback secret, ever. A process without an explicit
            // signing secret must not come up.
            secret: std::env::var("JWT_SECRET")
                .context("JWT_SECRET must be set; refusing to start with a default signing secret")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "mediflow".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "mediflow-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        let seed_demo_accounts = std::env::var("SEED_DEMO_ACCOUNTS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(database_url.is_none());
        Ok(Self {
            database_url,
            jwt,
            seed_demo_accounts,
        })
    }
}
