//! Server and database configuration.
//!
//! Loaded from YAML, then overridden by the `LISTEN` and `DATABASE_URL`
//! environment variables.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "pylon.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8083").
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8083".to_string(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Connections opened at startup; the pool never grows past this.
    pub pool_size: usize,
    /// Seconds between background liveness sweeps.
    pub repair_interval_secs: u64,
    /// Seconds to wait before retrying a sweep that found nothing idle.
    pub retry_delay_secs: u64,
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for a free connection. Unset waits forever.
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "pylon".to_string(),
            pool_size: 10,
            repair_interval_secs: 60,
            retry_delay_secs: 1,
            connect_timeout_ms: 3000,
            acquire_timeout_ms: None,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .field("repair_interval_secs", &self.repair_interval_secs)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .finish()
    }
}

impl DatabaseConfig {
    /// Builds a config from a URL such as `mysql://root:secret@db:3306/app`.
    ///
    /// The scheme is not checked. Parts missing from the URL keep their
    /// defaults.
    pub fn from_url(raw: &str) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_url(raw)?;
        Ok(cfg)
    }

    fn apply_url(&mut self, raw: &str) -> anyhow::Result<()> {
        let url = url::Url::parse(raw).context("Invalid database URL")?;

        if let Some(host) = url.host_str() {
            self.host = host.to_string();
        }
        if let Some(port) = url.port() {
            self.port = port;
        }
        if !url.username().is_empty() {
            self.user = url.username().to_string();
        }
        if let Some(password) = url.password() {
            self.password = password.to_string();
        }
        let database = url.path().trim_start_matches('/');
        if !database.is_empty() {
            self.database = database.to_string();
        }
        Ok(())
    }

    /// `host:port`, ready for socket address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn repair_interval(&self) -> Duration {
        Duration::from_secs(self.repair_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Loads `$PYLON_CONFIG`, else `pylon.yaml` if present, else defaults,
    /// then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("PYLON_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };

        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(listen_addr) = std::env::var("LISTEN") {
            self.server.listen_addr = listen_addr;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.apply_url(&url)?;
        }
        Ok(())
    }
}
