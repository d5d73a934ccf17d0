use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::RetryPolicy;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub search_path: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default)]
    pub create_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    #[serde(default = "default_reopen_on_eof")]
    pub reopen_on_eof: bool,
}

/// Retry budget for transient storage failures. `max_attempts = 0` means no
/// attempt limit; `max_elapsed_secs` then becomes the only bound.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub max_elapsed_secs: Option<u64>,
}

impl Config {
    /// Loads configuration from an optional file, then `INGEST_*` environment
    /// variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("INGEST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.postgres.port == 0 {
            return Err(Error::InvalidConfig("postgres.port must be non-zero".to_string()));
        }
        if self.postgres.connect_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "postgres.connect_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.postgres.write_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "postgres.write_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        if self.source.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("source.path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl PostgresConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Connection parameters for tokio-postgres. Built field by field so that
    /// credentials never need URL escaping.
    pub fn client_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .connect_timeout(self.connect_timeout())
            .application_name(env!("CARGO_PKG_NAME"));
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        if let Some(search_path) = &self.search_path {
            config.options(&format!("-c search_path={}", search_path));
        }
        config
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_elapsed: self.max_elapsed_secs.map(Duration::from_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            postgres: PostgresConfig::default(),
            source: SourceConfig::default(),
            retry: RetryConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            username: default_username(),
            password: String::new(),
            search_path: None,
            connect_timeout_secs: default_connect_timeout(),
            write_timeout_secs: default_write_timeout(),
            create_schema: false,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            reopen_on_eof: default_reopen_on_eof(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_elapsed_secs: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_username() -> String {
    "postgres".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    30
}

fn default_source_path() -> PathBuf {
    PathBuf::from("/dev/stdin")
}

fn default_reopen_on_eof() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_shutdown_grace_secs() -> u64 {
    5
}
