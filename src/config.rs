use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: usize,
    pub cleanup_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60 * 1000,
            max_requests: 10,
            cleanup_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            timeout_secs: 60,
            temperature: 0.7,
            max_output_tokens: 8000,
        }
    }
}

/// Administrator account created by `Store::init` when no admin exists yet.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSeedConfig {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Presence selects the Postgres backend; otherwise the local document store is used.
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub generation: GenerationConfig,
    pub admin: AdminSeedConfig,
    pub signup_credits: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "promptmaster".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "promptmaster-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            window_ms: env_parse("RATE_LIMIT_WINDOW_MS", defaults.window_ms),
            max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", defaults.max_requests),
            cleanup_secs: env_parse("RATE_LIMIT_CLEANUP_SECS", defaults.cleanup_secs),
        };

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: env_parse("GENERATION_TIMEOUT_SECS", defaults.timeout_secs),
            temperature: env_parse("GENERATION_TEMPERATURE", defaults.temperature),
            max_output_tokens: env_parse(
                "GENERATION_MAX_OUTPUT_TOKENS",
                defaults.max_output_tokens,
            ),
        };

        let admin = AdminSeedConfig {
            name: std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".into()),
            email: std::env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@promptmaster.local".into())
                .trim()
                .to_lowercase(),
            password: std::env::var("ADMIN_PASSWORD").ok(),
        };

        Ok(Self {
            database_url,
            data_dir,
            jwt,
            rate_limit,
            generation,
            admin,
            signup_credits: env_parse("SIGNUP_CREDITS", 10),
        })
    }

    pub fn storage_mode(&self) -> &'static str {
        if self.database_url.is_some() {
            "postgres"
        } else {
            "local"
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("PROMPTMASTER_TEST_NUM", "not-a-number");
        assert_eq!(env_parse("PROMPTMASTER_TEST_NUM", 42u64), 42);
        std::env::set_var("PROMPTMASTER_TEST_NUM", "7");
        assert_eq!(env_parse("PROMPTMASTER_TEST_NUM", 42u64), 7);
        std::env::remove_var("PROMPTMASTER_TEST_NUM");
    }

    #[test]
    fn rate_limit_defaults_match_one_minute_window() {
        let cfg = RateLimitConfig::default();
        assert_eq!(cfg.window_ms, 60_000);
        assert_eq!(cfg.max_requests, 10);
    }
}
