//! Gateway configuration: a TOML file with every field defaulted, then
//! environment overrides, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use logai_core::TriageConfig;
use serde::{Deserialize, Serialize};

use crate::cli::CliArgs;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 17990;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub triage: TriageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `logai/logai.db` under the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Off when only the `/api/logs/stream` feed should see log lines.
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stdout: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Resolve the effective configuration for a process.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = args.config.clone().or_else(|| env("LOGAI_CONFIG").map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(db) = lookup("LOGAI_DB") {
            self.database.path = Some(PathBuf::from(db));
        }
        if let Some(host) = lookup("LOGAI_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LOGAI_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("LOGAI_PORT is not a port number: {}", port))?;
        }
        if let Some(level) = lookup("LOGAI_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(db) = &args.db {
            self.database.path = Some(db.clone());
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("logai")
                .join("logai.db")
        })
    }
}
