//! Configuration management
//!
//! Everything is read from the process environment, optionally seeded from
//! `.env.{APP_ENV}` (`NODE_ENV` is honoured too) or `.env`. Each section can also be built from an
//! arbitrary lookup function, which is what the tests use.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::ConfigError;
use crate::models::Role;
use crate::provider::PartitionQuery;
use crate::sync::SyncOptions;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Environment used to pick the `.env.{name}` file when none is given.
pub const DEFAULT_APP_ENV: &str = "production";

/// Variables naming the environment, in order of precedence
pub const ENV_NAME_VARS: &[&str] = &["APP_ENV", "NODE_ENV"];

/// Default Postgres port when connecting by parts.
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default provider endpoint.
pub const DEFAULT_PROVIDER_ENDPOINT: &str =
    "https://efaturaws.fitbulut.com/ClientEInvoiceServices/ClientEInvoiceServicesPort.svc";

/// Default provider request timeout in seconds. The full user list is large.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 600;

/// Default target namespace of the e-invoice client service.
pub const DEFAULT_SOAP_NAMESPACE: &str = "http://fitcons.com/einvoice/";

/// Default SOAPAction header value.
pub const DEFAULT_SOAP_ACTION: &str = "getPartialUserList";

/// Default number of rows per INSERT statement inside a batch.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 1000;

/// Columns bound per row by the upsert; Postgres allows 65535 binds per statement.
const BINDS_PER_ROW: usize = 9;
const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

// ============================================================================
// Secrets
// ============================================================================

/// A credential that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First four characters followed by `****`
    pub fn masked(&self) -> String {
        let visible: String = self.0.chars().take(4).collect();
        format!("{visible}****")
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Complete run configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub run: RunConfig,
}

/// How to reach Postgres
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Url(Secret),
    Parts {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: Secret,
    },
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub target: DatabaseTarget,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub run_migrations: bool,
}

/// Remote provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub username: String,
    pub password: Secret,
    pub identifier: String,
    pub vkn_tckn: String,
    pub timeout_secs: u64,
    pub soap_namespace: String,
    pub soap_action: String,
}

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub role: Role,
    pub batch_size: usize,
    pub write_chunk_size: usize,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            scratch_dir: None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Environment name: the explicit one if given, else the first of
/// [`ENV_NAME_VARS`] that is set, else [`DEFAULT_APP_ENV`]
pub fn resolve_env_name<F>(explicit: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| ENV_NAME_VARS.iter().find_map(|var| optional(&lookup, var)))
        .unwrap_or_else(|| DEFAULT_APP_ENV.to_string())
}

/// [`resolve_env_name`] against the process environment
pub fn env_name(explicit: Option<&str>) -> String {
    resolve_env_name(explicit, env_lookup)
}

/// Load `.env.{env}` into the process environment, falling back to `.env`.
///
/// Variables already set in the environment win. A missing file is not an
/// error; the required variables are checked when the config is built.
/// Returns the file that was loaded, if any.
pub fn load_env_file(env: &str) -> Option<PathBuf> {
    dotenvy::from_filename(format!(".env.{env}"))
        .or_else(|_| dotenvy::dotenv())
        .ok()
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match optional(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, name: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::invalid(name, format!("'{v}' is not a boolean"))),
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl SyncConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database: DatabaseConfig::from_lookup(&lookup)?,
            provider: ProviderConfig::from_lookup(&lookup)?,
            run: RunConfig::from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.run.validate()
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            query: self.partition_query(),
            batch_size: self.run.batch_size,
            scratch_dir: self.run.scratch_dir.clone(),
        }
    }

    pub fn partition_query(&self) -> PartitionQuery {
        PartitionQuery {
            identifier: self.provider.identifier.clone(),
            vkn_tckn: self.provider.vkn_tckn.clone(),
            role: self.run.role,
            include_binary: true,
        }
    }

    /// Log the effective configuration with credentials masked
    pub fn log_summary(&self) {
        info!(
            database = %self.database.describe(),
            endpoint = %self.provider.endpoint,
            username = %self.provider.username,
            password = %self.provider.password.masked(),
            identifier = %self.provider.identifier,
            role = %self.run.role,
            batch_size = self.run.batch_size,
            write_chunk_size = self.run.write_chunk_size,
            "Configuration loaded"
        );
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target = match optional(lookup, "DATABASE_URL") {
            Some(url) => DatabaseTarget::Url(Secret::new(url)),
            None => DatabaseTarget::Parts {
                host: required(lookup, "DB_HOST")?,
                port: parsed(lookup, "DB_PORT", DEFAULT_DATABASE_PORT)?,
                database: required(lookup, "DB_NAME")?,
                user: required(lookup, "DB_USER")?,
                password: Secret::new(required(lookup, "DB_PASSWORD")?),
            },
        };

        Ok(Self {
            target,
            max_connections: parsed(
                lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            )?,
            connect_timeout_secs: parsed(
                lookup,
                "DATABASE_CONNECT_TIMEOUT",
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            )?,
            run_migrations: flag(lookup, "DB_RUN_MIGRATIONS")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::invalid(
                "DATABASE_MAX_CONNECTIONS",
                "must be greater than 0",
            ));
        }
        if let DatabaseTarget::Parts { port: 0, .. } = self.target {
            return Err(ConfigError::invalid("DB_PORT", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Where the database is, without credentials
    pub fn describe(&self) -> String {
        match &self.target {
            DatabaseTarget::Url(_) => "DATABASE_URL".to_string(),
            DatabaseTarget::Parts {
                host,
                port,
                database,
                user,
                ..
            } => format!("{user}@{host}:{port}/{database}"),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            endpoint: optional(lookup, "SOVOS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_PROVIDER_ENDPOINT.to_string()),
            username: required(lookup, "SOVOS_API_USERNAME")?,
            password: Secret::new(required(lookup, "SOVOS_API_PASSWORD")?),
            identifier: required(lookup, "SOVOS_IDENTIFIER")?,
            vkn_tckn: required(lookup, "SOVOS_VKNTCKN")?,
            timeout_secs: parsed(lookup, "SOVOS_TIMEOUT_SECS", DEFAULT_PROVIDER_TIMEOUT_SECS)?,
            soap_namespace: optional(lookup, "SOVOS_SOAP_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_SOAP_NAMESPACE.to_string()),
            soap_action: optional(lookup, "SOVOS_SOAP_ACTION")
                .unwrap_or_else(|| DEFAULT_SOAP_ACTION.to_string()),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RunConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let role = match optional(lookup, "SYNC_ROLE") {
            Some(raw) => raw
                .parse::<Role>()
                .map_err(|e| ConfigError::invalid("SYNC_ROLE", e))?,
            None => Role::default(),
        };

        Ok(Self {
            role,
            batch_size: parsed(lookup, "SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            write_chunk_size: parsed(lookup, "SYNC_WRITE_CHUNK_SIZE", DEFAULT_WRITE_CHUNK_SIZE)?,
            scratch_dir: optional(lookup, "SYNC_SCRATCH_DIR").map(PathBuf::from),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid(
                "SYNC_BATCH_SIZE",
                "must be greater than 0",
            ));
        }
        if self.write_chunk_size == 0 {
            return Err(ConfigError::invalid(
                "SYNC_WRITE_CHUNK_SIZE",
                "must be greater than 0",
            ));
        }
        if self.write_chunk_size * BINDS_PER_ROW > MAX_BIND_PARAMETERS {
            return Err(ConfigError::invalid(
                "SYNC_WRITE_CHUNK_SIZE",
                format!(
                    "at most {} rows fit in one statement",
                    MAX_BIND_PARAMETERS / BINDS_PER_ROW
                ),
            ));
        }
        Ok(())
    }
}
