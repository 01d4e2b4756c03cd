use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::service::DEFAULT_JOIN_CONCURRENCY;
use crate::storage::StoreConfig;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_CLUSTER: &str = "cluster0.wmzdc.mongodb.net";

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageSection,
    pub api: ApiSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from `.env`, disk and environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = env::var("VISA_CONFIG").unwrap_or_else(|_| "visa.toml".to_string());

        let mut builder = config::Config::builder();

        if Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::from(PathBuf::from(&config_path)));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VISA")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        let mut config: Self = settings.try_deserialize()?;

        config.apply_env_overrides(|key| env::var(key).ok())?;

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }

        Ok(config)
    }

    /// Apply the unprefixed deployment variables `DB_USER`, `DB_PASS` and `PORT`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("DB_USER") {
            self.storage.mongo.user = user;
        }
        if let Some(password) = lookup("DB_PASS") {
            self.storage.mongo.password = password;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT '{}'", port))?;
        }
        Ok(())
    }

    /// Resolve the storage backend configuration.
    pub fn storage_runtime(&self) -> Result<StoreConfig> {
        self.storage.to_runtime()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackendKind,
    pub mongo: MongoSection,
}

impl StorageSection {
    pub fn to_runtime(&self) -> Result<StoreConfig> {
        match self.backend {
            StorageBackendKind::Memory => Ok(StoreConfig::Memory),
            StorageBackendKind::Mongo => {
                if self.mongo.database.trim().is_empty() {
                    bail!("storage.mongo.database must be specified");
                }
                Ok(StoreConfig::Mongo {
                    uri: self.mongo.connection_uri()?,
                    database: self.mongo.database.clone(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Mongo,
    Memory,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MongoSection {
    pub user: String,
    pub password: String,
    pub cluster: String,
    pub app_name: String,
    pub database: String,
    /// Full connection string; takes precedence over the parts above
    pub uri: Option<String>,
}

impl MongoSection {
    /// Build the `mongodb+srv` connection string for the configured cluster.
    pub fn connection_uri(&self) -> Result<String> {
        if let Some(uri) = self.uri.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Ok(uri.to_string());
        }

        if self.user.trim().is_empty() || self.password.is_empty() {
            bail!("DB_USER and DB_PASS must be set when storage.mongo.uri is not provided");
        }
        if self.cluster.trim().is_empty() {
            bail!("storage.mongo.cluster must be specified");
        }

        Ok(format!(
            "mongodb+srv://{}:{}@{}/?retryWrites=true&w=majority&appName={}",
            self.user.trim(),
            self.password,
            self.cluster.trim(),
            self.app_name
        ))
    }
}

impl Default for MongoSection {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            cluster: DEFAULT_CLUSTER.to_string(),
            app_name: "Cluster0".to_string(),
            database: "visaDB".to_string(),
            uri: None,
        }
    }
}

impl fmt::Debug for MongoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoSection")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("cluster", &self.cluster)
            .field("app_name", &self.app_name)
            .field("database", &self.database)
            .field("uri", &self.uri.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Concurrent visa lookups when joining applications
    pub join_concurrency: usize,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            join_concurrency: DEFAULT_JOIN_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}
