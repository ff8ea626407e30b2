//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. The configuration is read once at
//! startup and never changes afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bazaar_shared::constants::{DEFAULT_DB_TIMEOUT_MS, DEFAULT_HTTP_PORT, DEFAULT_TOKEN_TTL_MINUTES};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOKEN_SIGNING_KEY is invalid: {0}")]
    SigningKey(String),
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./bazaar.db`
    pub database_path: PathBuf,

    /// Ed25519 seed for the token authority (hex-encoded, 64 chars).
    /// Env: `TOKEN_SIGNING_KEY`
    /// Default: unset, a random key is generated at startup (development only).
    pub token_signing_key: Option<[u8; 32]>,

    /// Access-token lifetime.
    /// Env: `TOKEN_TTL_MINUTES`
    /// Default: `20`
    pub token_ttl: chrono::Duration,

    /// Upper bound for lock waits and for a whole review submission.
    /// Env: `DB_TIMEOUT_MS`
    /// Default: `5000`
    pub db_timeout: Duration,

    /// Maximum idle pooled connections.
    /// Env: `POOL_SIZE`
    /// Default: `8`
    pub pool_size: usize,

    /// Bootstrap admin account, created at startup if the username is free.
    /// Env: `ADMIN_USERNAME`, `ADMIN_PASSWORD`
    pub bootstrap_admin: Option<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./bazaar.db"),
            token_signing_key: None,
            token_ttl: chrono::Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
            db_timeout: Duration::from_millis(DEFAULT_DB_TIMEOUT_MS),
            pool_size: 8,
            bootstrap_admin: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("token_signing_key", &self.token_signing_key.map(|_| "<redacted>"))
            .field("token_ttl_minutes", &self.token_ttl.num_minutes())
            .field("db_timeout", &self.db_timeout)
            .field("pool_size", &self.pool_size)
            .field(
                "bootstrap_admin",
                &self.bootstrap_admin.as_ref().map(|(name, _)| name),
            )
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// A malformed signing key is fatal; every other malformed value is
    /// replaced by its default with a warning.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = get("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(hex_key) = get("TOKEN_SIGNING_KEY") {
            let key = parse_hex_key(&hex_key).map_err(ConfigError::SigningKey)?;
            config.token_signing_key = Some(key);
        }

        if let Some(val) = get("TOKEN_TTL_MINUTES") {
            match val.parse::<i64>().ok().and_then(token_ttl_from_minutes) {
                Some(ttl) => config.token_ttl = ttl,
                None => tracing::warn!(value = %val, "Invalid TOKEN_TTL_MINUTES, using default"),
            }
        }

        if let Some(val) = get("DB_TIMEOUT_MS") {
            match val.parse::<u64>() {
                // SQLite takes the busy timeout as an i32 of milliseconds.
                Ok(n) if n > 0 && n <= i32::MAX as u64 => {
                    config.db_timeout = Duration::from_millis(n)
                }
                _ => tracing::warn!(value = %val, "Invalid DB_TIMEOUT_MS, using default"),
            }
        }

        if let Some(val) = get("POOL_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.pool_size = n,
                _ => tracing::warn!(value = %val, "Invalid POOL_SIZE, using default"),
            }
        }

        if let (Some(user), Some(pass)) = (get("ADMIN_USERNAME"), get("ADMIN_PASSWORD")) {
            if !user.is_empty() && !pass.is_empty() {
                config.bootstrap_admin = Some((user, pass));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        Ok(config)
    }
}

/// A positive lifetime that can still be added to the current time.
fn token_ttl_from_minutes(minutes: i64) -> Option<chrono::Duration> {
    if minutes <= 0 {
        return None;
    }
    let ttl = chrono::Duration::try_minutes(minutes)?;
    chrono::Utc::now().checked_add_signed(ttl)?;
    Some(ttl)
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_key(hex_str: &str) -> Result<[u8; 32], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_str.len()));
    }
    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]).unwrap();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.token_ttl, chrono::Duration::minutes(20));
        assert!(config.token_signing_key.is_none());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_parse_hex_key() {
        let hex = "ab".repeat(32);
        let key = parse_hex_key(&hex).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn test_parse_hex_key_wrong_length() {
        assert!(parse_hex_key("abcd").is_err());
        assert!(parse_hex_key(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_bad_signing_key_is_fatal() {
        assert!(matches!(
            load(&[("TOKEN_SIGNING_KEY", "nope")]),
            Err(ConfigError::SigningKey(_))
        ));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = load(&[
            ("TOKEN_TTL_MINUTES", "-5"),
            ("DB_TIMEOUT_MS", "soon"),
            ("POOL_SIZE", "0"),
        ])
        .unwrap();
        assert_eq!(config.token_ttl, chrono::Duration::minutes(20));
        assert_eq!(config.db_timeout, Duration::from_millis(5000));
        assert_eq!(config.pool_size, 8);
    }

    #[test]
    fn test_out_of_range_numbers_fall_back() {
        for ttl in ["999999999999999999", "200000000000"] {
            let config = load(&[("TOKEN_TTL_MINUTES", ttl)]).unwrap();
            assert_eq!(config.token_ttl, chrono::Duration::minutes(20), "{ttl}");
        }

        let config = load(&[("DB_TIMEOUT_MS", "3000000000")]).unwrap();
        assert_eq!(config.db_timeout, Duration::from_millis(5000));

        let config = load(&[("DB_TIMEOUT_MS", &i32::MAX.to_string())]).unwrap();
        assert_eq!(config.db_timeout, Duration::from_millis(i32::MAX as u64));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/x.db"),
            ("TOKEN_SIGNING_KEY", &"01".repeat(32)),
            ("TOKEN_TTL_MINUTES", "60"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.token_signing_key, Some([1u8; 32]));
        assert_eq!(config.token_ttl, chrono::Duration::minutes(60));
        assert_eq!(config.bootstrap_admin, Some(("root".into(), "s3cret".into())));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("TOKEN_SIGNING_KEY", &"01".repeat(32)),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "s3cret"),
        ])
        .unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("s3cret"));
        assert!(!printed.contains(&"01".repeat(32)));
    }
}
