use anyhow::Context;
use directories::ProjectDirs;
use gitlab_import_providers::HttpSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_all_origins: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    /// PEM bundle trusted for outbound GitLab and backend calls.
    pub certs_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Base URL of the backend API, e.g. `http://localhost:5001/api`.
    pub api_url: String,
    pub cors: CorsConfig,
    pub ca: CaConfig,
    pub http_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            api_url: "http://localhost:5001/api".to_string(),
            cors: CorsConfig::default(),
            ca: CaConfig::default(),
            http_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    /// Reads the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).context("read config")?;
        let config = serde_json::from_str(&data).context("parse config")?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("invalid bind address {}", self.bind_address))
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            ca_certs_file: self.ca.certs_file.clone(),
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let project =
        ProjectDirs::from("com", "gitlab-import", "gitlab-import").context("resolve project dirs")?;
    Ok(project.config_dir().join("config.json"))
}
