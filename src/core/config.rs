use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::akool::{AkoolCredentials, WebhookError};
use crate::core::migrations::{DriftPolicy, FailurePolicy, MigrationRunner};

pub const DEFAULT_CONFIG_FILE: &str = "airshorts.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidEnv {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("Akool credentials are not configured (set AKOOL_CLIENT_ID and AKOOL_CLIENT_SECRET)")]
    MissingCredentials,
    #[error(transparent)]
    Credentials(#[from] WebhookError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migrations: MigrationsConfig,
    #[serde(default)]
    pub akool: AkoolConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default)]
    pub on_drift: DriftPolicy,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AkoolConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("airshorts.db")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_extension() -> String {
    crate::core::migrations::DEFAULT_EXTENSION.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            extension: default_extension(),
            on_failure: FailurePolicy::default(),
            on_drift: DriftPolicy::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl std::fmt::Debug for AkoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = if self.client_secret.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("AkoolConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &secret)
            .finish()
    }
}

impl AkoolConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn credentials(&self) -> Result<AkoolCredentials, ConfigError> {
        if !self.is_configured() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(AkoolCredentials::new(
            self.client_id.clone(),
            self.client_secret.clone(),
        )?)
    }
}

impl MigrationsConfig {
    pub fn runner(&self) -> MigrationRunner {
        MigrationRunner::new(&self.dir)
            .with_extension(self.extension.clone())
            .with_failure_policy(self.on_failure)
            .with_drift_policy(self.on_drift)
    }
}

impl AppConfig {
    /// Load from `path`, or from `airshorts.toml` if it exists, then apply
    /// environment overrides. An explicit path that is missing is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Overlay environment variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AKOOL_CLIENT_ID") {
            self.akool.client_id = v;
        }
        if let Some(v) = get("AKOOL_CLIENT_SECRET") {
            self.akool.client_secret = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = get("MIGRATIONS_DIR") {
            self.migrations.dir = PathBuf::from(v);
        }
        if let Some(v) = get("AIRSHORTS_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("AIRSHORTS_PORT") {
            self.server.port = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "AIRSHORTS_PORT",
                expected: "a port number",
                value: v.clone(),
            })?;
        }
        Ok(())
    }
}
