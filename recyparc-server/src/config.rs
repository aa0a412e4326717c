//! TOML configuration for the server binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use recyparc_provider_api::ApiSettings;

/// Environment variable naming the configuration file.
pub(crate) const CONFIG_ENV: &str = "RECYPARC_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "recyparc.toml";

/// Complete server configuration. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) server: ServerConfig,
    pub(crate) api: ApiConfig,
    pub(crate) logging: LoggingConfig,
}

/// Listening socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote visitor and invoice API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct ApiConfig {
    pub(crate) base_url: String,
    pub(crate) auth_token: String,
    pub(crate) workshop_id: String,
    pub(crate) lookup_timeout_secs: u64,
    pub(crate) invoice_timeout_secs: u64,
    /// Fetch the visitor list on startup and after each scenario reset.
    pub(crate) preload_visitors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let settings = ApiSettings::default();
        Self {
            base_url: settings.base_url,
            auth_token: settings.auth_token,
            workshop_id: settings.workshop_id,
            lookup_timeout_secs: settings.lookup_timeout.as_secs(),
            invoice_timeout_secs: settings.invoice_timeout.as_secs(),
            preload_visitors: false,
        }
    }
}

impl ApiConfig {
    pub(crate) fn settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.base_url.clone(),
            auth_token: self.auth_token.clone(),
            workshop_id: self.workshop_id.clone(),
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
            invoice_timeout: Duration::from_secs(self.invoice_timeout_secs),
        }
    }
}

/// Log filter used when `RUST_LOG` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct LoggingConfig {
    pub(crate) level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document.
    pub(crate) fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid configuration")
    }

    /// Read and parse the file at `path`.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml(&raw)
    }
}

/// Path from `RECYPARC_CONFIG`, or `recyparc.toml` in the working directory.
pub(crate) fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}
