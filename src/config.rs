//! Process configuration, read once at startup from the environment
//! (optionally seeded from a `.env` file).

use reqwest::Url;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::jobs::roster::{RosterSettings, DEFAULT_TOPIC_VERSION, DEFAULT_WORKERS_PER_TOPIC};
use crate::jobs::topic_worker::DEFAULT_STATS_INTERVAL;
use crate::services::batcher::{DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT};

const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_HEALTH_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "{} must be set", var),
            ConfigError::Invalid { var, value } => write!(f, "Invalid value for {}: {}", var, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => f.write_str("local"),
            Environment::Staging => f.write_str("staging"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db: String,
    pub max_connections: Option<u32>,
}

#[derive(Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Clone)]
pub struct RegistryConfig {
    pub url: String,
    pub api_key: String,
    pub secret_key: String,
}

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
    pub registry: RegistryConfig,
    pub telemetry_dsn: Option<String>,
    pub health_port: u16,
    pub roster: RosterSettings,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Environment Variables
    ///
    /// * `ENV` - local | staging | production (default: local)
    /// * `POSTGRES_HOST`, `POSTGRES_USER`, `POSTGRES_PASSWORD`, `POSTGRES_DB` (required)
    /// * `POSTGRES_PORT` (default: 5432)
    /// * `POSTGRES_MAX_CONNECTIONS` (default: two per roster worker)
    /// * `SIMPLEHASH_BOOTSTRAP_SERVERS`, `SIMPLEHASH_GROUP_ID`, `SIMPLEHASH_API_KEY`,
    ///   `SIMPLEHASH_API_SECRET` (required)
    /// * `SIMPLEHASH_REGISTRY_URL`, `SIMPLEHASH_REGISTRY_API_KEY`,
    ///   `SIMPLEHASH_REGISTRY_SECRET_KEY` (required)
    /// * `TELEMETRY_DSN` (optional)
    /// * `HEALTH_PORT` (default: 3000)
    /// * `MIRROR_TOPIC_VERSION` (default: 4)
    /// * `MIRROR_WORKERS_PER_TOPIC` (default: 2)
    /// * `MIRROR_BATCH_SIZE` (default: 250)
    /// * `MIRROR_BATCH_TIMEOUT_MS` (default: 1000)
    /// * `MIRROR_STATS_INTERVAL_SECS` (default: 3600)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let environment = match lookup("ENV") {
            None => Environment::Local,
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "ENV", value })?,
        };

        let postgres = PostgresConfig {
            host: required("POSTGRES_HOST")?,
            port: parse_or(&lookup, "POSTGRES_PORT", DEFAULT_POSTGRES_PORT)?,
            user: required("POSTGRES_USER")?,
            password: required("POSTGRES_PASSWORD")?,
            db: required("POSTGRES_DB")?,
            max_connections: parse_opt(&lookup, "POSTGRES_MAX_CONNECTIONS")?,
        };

        let kafka = KafkaConfig {
            bootstrap_servers: required("SIMPLEHASH_BOOTSTRAP_SERVERS")?,
            group_id: required("SIMPLEHASH_GROUP_ID")?,
            api_key: required("SIMPLEHASH_API_KEY")?,
            api_secret: required("SIMPLEHASH_API_SECRET")?,
        };

        let registry = RegistryConfig {
            url: required("SIMPLEHASH_REGISTRY_URL")?,
            api_key: required("SIMPLEHASH_REGISTRY_API_KEY")?,
            secret_key: required("SIMPLEHASH_REGISTRY_SECRET_KEY")?,
        };

        let roster = RosterSettings {
            topic_version: parse_or(&lookup, "MIRROR_TOPIC_VERSION", DEFAULT_TOPIC_VERSION)?,
            workers_per_topic: parse_or(&lookup, "MIRROR_WORKERS_PER_TOPIC", DEFAULT_WORKERS_PER_TOPIC)?,
            batch_size: parse_or(&lookup, "MIRROR_BATCH_SIZE", DEFAULT_MAX_SIZE)?,
            batch_timeout: Duration::from_millis(parse_or(
                &lookup,
                "MIRROR_BATCH_TIMEOUT_MS",
                DEFAULT_TIMEOUT.as_millis() as u64,
            )?),
            stats_interval: Duration::from_secs(parse_or(
                &lookup,
                "MIRROR_STATS_INTERVAL_SECS",
                DEFAULT_STATS_INTERVAL.as_secs(),
            )?),
        };

        if roster.workers_per_topic == 0 {
            return Err(ConfigError::Invalid {
                var: "MIRROR_WORKERS_PER_TOPIC",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            environment,
            postgres,
            kafka,
            registry,
            telemetry_dsn: lookup("TELEMETRY_DSN").filter(|v| !v.is_empty()),
            health_port: parse_or(&lookup, "HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            roster,
        })
    }

    /// Postgres URL with percent-encoded credentials
    pub fn database_url(&self) -> Result<String, ConfigError> {
        let pg = &self.postgres;
        let invalid = || ConfigError::Invalid {
            var: "POSTGRES_HOST",
            value: pg.host.clone(),
        };

        let mut url = Url::parse(&format!("postgres://{}:{}", pg.host, pg.port)).map_err(|_| invalid())?;
        url.set_username(&pg.user).map_err(|_| invalid())?;
        url.set_password(Some(&pg.password)).map_err(|_| invalid())?;
        url.set_path(&format!("/{}", pg.db));

        Ok(url.to_string())
    }

    /// Pool size: every worker may hold a connection while a batch is in flight
    pub fn max_connections(&self) -> u32 {
        self.postgres
            .max_connections
            .unwrap_or((self.roster.roster_size() * 2) as u32)
    }
}

fn parse_opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_opt(lookup, var)?.unwrap_or(default))
}
