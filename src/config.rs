use anyhow::{bail, Context};
use std::path::PathBuf;

use crate::rate_limit::RateLimitConfig;
use crate::signup::CodeSettings;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub codes: CodeSettings,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub rate_limit: RateLimitConfig,
}

pub const MIN_SECRET_LEN: usize = 32;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(v) => v.parse().map_err(|e| anyhow::anyhow!("{name}={v:?}: {e}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long");
        }
        let code_ttl_mins: i64 = parsed("CONFIRMATION_CODE_TTL_MINS", 24 * 60)?;
        Ok(Self {
            jwt_secret,
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", 24)?,
            codes: CodeSettings {
                mail_from: var("MAIL_FROM").unwrap_or_else(|| CodeSettings::default().mail_from),
                ttl: chrono::Duration::minutes(code_ttl_mins),
            },
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("PORT", 8080)?,
            database_url: var("DATABASE_URL"),
            data_dir: var("YAMDB_DATA_DIR").map(PathBuf::from),
            frontend_url: var("FRONTEND_URL"),
            enable_hsts: var("ENABLE_HSTS").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            rate_limit: RateLimitConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = ["JWT_SECRET", "JWT_TTL_HOURS", "PORT", "CONFIRMATION_CODE_TTL_MINS"];

    fn clear() { for v in VARS { std::env::remove_var(v); } }

    #[test]
    #[serial]
    fn secret_is_required_and_checked() {
        clear();
        assert!(AppConfig::from_env().is_err());
        std::env::set_var("JWT_SECRET", "short");
        assert!(AppConfig::from_env().is_err());
        clear();
    }

    #[test]
    #[serial]
    fn defaults_and_overrides() {
        clear();
        std::env::set_var("JWT_SECRET", "x".repeat(MIN_SECRET_LEN));
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.jwt_ttl_hours, 24);
        assert_eq!(cfg.codes.ttl, chrono::Duration::hours(24));

        std::env::set_var("PORT", "9000");
        std::env::set_var("CONFIRMATION_CODE_TTL_MINS", "15");
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.codes.ttl, chrono::Duration::minutes(15));

        std::env::set_var("PORT", "not-a-port");
        assert!(AppConfig::from_env().is_err());
        clear();
    }
}
