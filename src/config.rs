use std::str::FromStr;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Secret used when `JWT_SECRET` is not configured.
pub const FALLBACK_JWT_SECRET: &str = "your-secret-key";

/// Upper bound on token lifetime: ten years.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 366 * 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("unknown STORAGE_BACKEND `{other}` (expected memory or postgres)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// True when `secret` is [`FALLBACK_JWT_SECRET`].
    pub secret_is_fallback: bool,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");
        let storage = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };
        if storage == StorageBackend::Postgres && database_url.is_none() {
            bail!("STORAGE_BACKEND=postgres requires DATABASE_URL");
        }

        let (secret, secret_is_fallback) = match var("JWT_SECRET") {
            Some(s) => (s, false),
            None => (FALLBACK_JWT_SECRET.to_string(), true),
        };
        let jwt = JwtConfig {
            secret,
            secret_is_fallback,
            ttl_minutes: parse_or(var("JWT_TTL_MINUTES"), "JWT_TTL_MINUTES", 60 * 24)?,
        };
        if jwt.ttl_minutes <= 0 || jwt.ttl_minutes > MAX_TTL_MINUTES {
            bail!("JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}");
        }

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: parse_or(var("PASSWORD_MEMORY_KIB"), "PASSWORD_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(var("PASSWORD_ITERATIONS"), "PASSWORD_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(
                var("PASSWORD_PARALLELISM"),
                "PASSWORD_PARALLELISM",
                defaults.parallelism,
            )?,
        };

        let port = match var("APP_PORT").or_else(|| var("PORT")) {
            Some(p) => p.parse().with_context(|| format!("invalid port `{p}`"))?,
            None => 5000,
        };

        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage,
            database_url,
            jwt,
            password,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.trim().parse().with_context(|| format!("invalid {key} `{v}`")),
        None => Ok(default),
    }
}
