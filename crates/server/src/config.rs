//! Service configuration: TOML file plus environment overrides

use pecoin_core::{Error, Result};
use pecoin_engine::CacheSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "pecoin.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint with DAS support
    pub url: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mainnet-beta.solana.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub supabase_url: String,
    pub service_key: String,
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            service_key: String::new(),
            bucket: "logos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pecoin.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcosystemConfig {
    /// Keep the aggregate warm in the background
    pub auto_refresh: bool,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self { auto_refresh: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token for `/api/admin`; the admin surface is off when unset
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub caches: CacheSettings,
    pub ecosystem: EcosystemConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Load from `PECOIN_CONFIG` (or `pecoin.toml` if present), apply
    /// `PECOIN_*` overrides, and validate
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("PECOIN_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Deployment secrets and addresses come from the environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("PECOIN_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("PECOIN_RPC_URL") {
            self.rpc.url = v;
        }
        if let Some(v) = var("PECOIN_SUPABASE_URL") {
            self.storage.supabase_url = v;
        }
        if let Some(v) = var("PECOIN_SUPABASE_KEY") {
            self.storage.service_key = v;
        }
        if let Some(v) = var("PECOIN_STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = var("PECOIN_DATABASE") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = var("PECOIN_ADMIN_TOKEN") {
            self.admin.token = Some(v);
        }
        if let Some(v) = var("PECOIN_MINT") {
            self.caches.ecosystem.mint = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.rpc.url.trim().is_empty() {
            return Err(Error::ConfigError("rpc.url is required".into()));
        }
        if self.storage.supabase_url.trim().is_empty() || self.storage.service_key.trim().is_empty() {
            return Err(Error::ConfigError(
                "storage.supabase_url and storage.service_key are required".into(),
            ));
        }
        if self.caches.ecosystem.mint.trim().is_empty() {
            return Err(Error::ConfigError("caches.ecosystem.mint is required".into()));
        }
        if matches!(&self.admin.token, Some(t) if t.len() < 16) {
            return Err(Error::ConfigError(
                "admin.token must be at least 16 characters".into(),
            ));
        }

        self.caches.validate()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|e| Error::ConfigError(format!("server.bind {:?}: {}", self.server.bind, e)))
    }
}
