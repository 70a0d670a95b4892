//! User store configuration.

use std::env;
use std::str::FromStr;

use common::{AppError, AppResult, DatabaseConfig, LockConfig};
use domain::{CaseSensitivity, UsernamePolicy};

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    /// SeaORM-backed SQL database (durable)
    #[default]
    Sql,
    /// Process-local maps (tests, ephemeral tooling)
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sql" | "postgres" | "sqlite" => Ok(StorageBackend::Sql),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(AppError::invalid_input(format!(
                "Unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Username rules as read from configuration.
#[derive(Debug, Clone, Default)]
pub struct UsernameConfig {
    pub case_insensitive: bool,
    pub trim: bool,
    pub pattern: Option<String>,
}

impl UsernameConfig {
    /// Build the runtime policy, compiling the pattern if one is set.
    pub fn policy(&self) -> AppResult<UsernamePolicy> {
        let case = if self.case_insensitive {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Exact
        };
        let policy = UsernamePolicy::new(case, self.trim);

        match &self.pattern {
            Some(pattern) => Ok(policy.with_pattern(pattern)?),
            None => Ok(policy),
        }
    }
}

/// User store configuration.
#[derive(Debug, Clone, Default)]
pub struct UserStoreConfig {
    pub backend: StorageBackend,
    pub database: DatabaseConfig,
    pub lock: LockConfig,
    pub username: UsernameConfig,
}

impl UserStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let backend = match env::var("USER_STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            backend,
            database: DatabaseConfig {
                url: env::var("USER_STORE_DATABASE_URL")
                    .or_else(|_| env::var("DATABASE_URL"))
                    .unwrap_or(defaults.database.url),
                max_connections: parse_var("USER_STORE_DB_MAX_CONNECTIONS")
                    .unwrap_or(defaults.database.max_connections),
                min_connections: parse_var("USER_STORE_DB_MIN_CONNECTIONS")
                    .unwrap_or(defaults.database.min_connections),
            },
            lock: LockConfig {
                timeout_ms: parse_var("USER_STORE_LOCK_TIMEOUT_MS")
                    .unwrap_or(defaults.lock.timeout_ms),
            },
            username: UsernameConfig {
                case_insensitive: parse_flag("USER_STORE_USERNAME_CASE_INSENSITIVE"),
                trim: parse_flag("USER_STORE_USERNAME_TRIM"),
                pattern: env::var("USER_STORE_USERNAME_PATTERN")
                    .ok()
                    .filter(|p| !p.is_empty()),
            },
        })
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn parse_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
