/// Application name
pub const APP_NAME: &str = "Bazaar";

/// Lowest grade a rating may carry (inclusive)
pub const GRADE_MIN: f64 = 1.0;

/// Highest grade a rating may carry (inclusive)
pub const GRADE_MAX: f64 = 10.0;

/// Default access-token lifetime in minutes
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 20;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default storage timeout in milliseconds
pub const DEFAULT_DB_TIMEOUT_MS: u64 = 5_000;

/// Salt length for password verifiers, in bytes
pub const PASSWORD_SALT_SIZE: usize = 16;
