use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Server configuration, read from `WISHLIST_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: TimeDelta,
    pub max_file_size: u64,
    pub cleanup_interval_secs: u64,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("WISHLIST_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("WISHLIST_JWT_SECRET is unset or still a placeholder");
        }

        let token_ttl_secs: i64 = parse_or(&get, "WISHLIST_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        if token_ttl_secs <= 0 {
            bail!("WISHLIST_TOKEN_TTL_SECS must be positive");
        }
        let Some(token_ttl) = TimeDelta::try_seconds(token_ttl_secs) else {
            bail!("WISHLIST_TOKEN_TTL_SECS is out of range: {token_ttl_secs}");
        };

        let cleanup_interval_secs: u64 = parse_or(&get, "WISHLIST_CLEANUP_INTERVAL_SECS", 3600)?;
        if cleanup_interval_secs == 0 {
            bail!("WISHLIST_CLEANUP_INTERVAL_SECS must be positive");
        }

        let allowed_origins = get("WISHLIST_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: get("WISHLIST_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "WISHLIST_PORT", 3000)?,
            db_path: get("WISHLIST_DB_PATH").unwrap_or_else(|| "wishlist.db".into()).into(),
            storage_dir: get("WISHLIST_STORAGE_DIR").unwrap_or_else(|| "./storage".into()).into(),
            jwt_secret,
            token_ttl,
            max_file_size: parse_or(&get, "WISHLIST_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            cleanup_interval_secs,
            allowed_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("WISHLIST_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert_eq!(config.db_path, PathBuf::from("wishlist.db"));
        assert_eq!(config.token_ttl.num_seconds(), DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("WISHLIST_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("WISHLIST_JWT_SECRET", "s3cret"),
            ("WISHLIST_PORT", "8080"),
            ("WISHLIST_MAX_FILE_SIZE", "1024"),
            ("WISHLIST_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_file_size, 1024);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn bad_numbers_are_errors() {
        let res = Config::from_lookup(lookup(&[
            ("WISHLIST_JWT_SECRET", "s3cret"),
            ("WISHLIST_PORT", "eighty"),
        ]));
        assert!(res.is_err());

        let res = Config::from_lookup(lookup(&[
            ("WISHLIST_JWT_SECRET", "s3cret"),
            ("WISHLIST_TOKEN_TTL_SECS", "0"),
        ]));
        assert!(res.is_err());

        let res = Config::from_lookup(lookup(&[
            ("WISHLIST_JWT_SECRET", "s3cret"),
            ("WISHLIST_CLEANUP_INTERVAL_SECS", "0"),
        ]));
        assert!(res.is_err());

        let res = Config::from_lookup(lookup(&[
            ("WISHLIST_JWT_SECRET", "s3cret"),
            ("WISHLIST_TOKEN_TTL_SECS", "9223372036854775807"),
        ]));
        assert!(res.is_err());
    }
}
